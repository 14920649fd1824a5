use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;

use super::constants::{
    FRAME_DISCRIMINANT_SHIFT, FRAME_LENGTH_MASK, MAX_RECORD_WORDS, RUN_HEADER_DISCRIMINANT,
    WORD_SIZE,
};
use super::error::RecordError;

/// A single framed chunk of the run stream.
///
/// The frame word is one little endian u32: the top 14 bits are the discriminant (data id)
/// and the low 18 bits are the total length in long words, including the frame word itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub discriminant: u16,
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Record {
    /// Split a frame word into (discriminant, length)
    pub fn parse_frame_word(word: u32) -> (u16, u32) {
        (
            (word >> FRAME_DISCRIMINANT_SHIFT) as u16,
            word & FRAME_LENGTH_MASK,
        )
    }

    /// Build the frame word for this record
    pub fn frame_word(&self) -> u32 {
        ((self.discriminant as u32) << FRAME_DISCRIMINANT_SHIFT) | (self.length & FRAME_LENGTH_MASK)
    }

    /// Size of the payload in bytes; always 4 * length - 4
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_run_header(&self) -> bool {
        self.discriminant == RUN_HEADER_DISCRIMINANT
    }

    /// Serialize the record back into its framed form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; WORD_SIZE];
        LittleEndian::write_u32(&mut bytes, self.frame_word());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// The run file header, which is carried as the record with discriminant 0.
///
/// The first payload word is the header size in bytes, followed by the XML property list
/// describing the run. Only the raw text is kept here; interpreting it is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHeader {
    pub xml: String,
}

impl TryFrom<&Record> for RunHeader {
    type Error = RecordError;
    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        if record.payload.len() < WORD_SIZE {
            return Err(RecordError::BadRunHeader(0));
        }
        let n_bytes = LittleEndian::read_u32(&record.payload[..WORD_SIZE]) as usize;
        let text = &record.payload[WORD_SIZE..];
        if n_bytes > text.len() {
            return Err(RecordError::BadRunHeader(n_bytes));
        }
        let xml = String::from_utf8_lossy(&text[..n_bytes])
            .trim_end_matches('\0')
            .to_string();
        Ok(Self { xml })
    }
}

/// RecordReader owns the cursor into a run stream and hands out one Record at a time.
///
/// Framing is length prefixed, so every record must be fully consumed before the next
/// frame word can be found. Decoders never see the reader.
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    source: R,
    max_record_words: u32,
    records_read: u64,
    bytes_read: u64,
}

impl<R: Read> RecordReader<R> {
    /// Create a reader with the default sanity ceiling (the largest length a frame can encode)
    pub fn new(source: R) -> Self {
        Self::with_ceiling(source, MAX_RECORD_WORDS)
    }

    /// Create a reader which rejects any frame longer than `max_record_words`
    pub fn with_ceiling(source: R, max_record_words: u32) -> Self {
        Self {
            source,
            max_record_words,
            records_read: 0,
            bytes_read: 0,
        }
    }

    /// Get the next record in the stream
    ///
    /// Returns a `Result<Option<Record>>`. The Option is None if the stream ended cleanly
    /// on a frame boundary. A partial frame word or payload is a TruncatedRecord error.
    pub fn next_record(&mut self) -> Result<Option<Record>, RecordError> {
        let mut frame = [0u8; WORD_SIZE];
        let n_frame = self.fill(&mut frame)?;
        if n_frame == 0 {
            return Ok(None);
        } else if n_frame < WORD_SIZE {
            return Err(RecordError::TruncatedRecord {
                expected: WORD_SIZE,
                available: n_frame,
            });
        }

        let (discriminant, length) = Record::parse_frame_word(LittleEndian::read_u32(&frame));
        if length == 0 || length > self.max_record_words {
            return Err(RecordError::CorruptFraming {
                length,
                ceiling: self.max_record_words,
            });
        }

        let payload_size = (length as usize - 1) * WORD_SIZE;
        let mut payload = vec![0u8; payload_size];
        let n_payload = self.fill(&mut payload)?;
        if n_payload < payload_size {
            return Err(RecordError::TruncatedRecord {
                expected: payload_size,
                available: n_payload,
            });
        }

        self.records_read += 1;
        self.bytes_read += (WORD_SIZE + payload_size) as u64;
        Ok(Some(Record {
            discriminant,
            length,
            payload,
        }))
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read until the buffer is full or the source is exhausted, returning the count read
    fn fill(&mut self, buffer: &mut [u8]) -> Result<usize, RecordError> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.source.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordError::IOError(e)),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(discriminant: u16, payload: &[u8]) -> Vec<u8> {
        let record = Record {
            discriminant,
            length: (payload.len() / WORD_SIZE + 1) as u32,
            payload: payload.to_vec(),
        };
        record.to_bytes()
    }

    #[test]
    fn test_frame_word_fields() {
        let (discriminant, length) = Record::parse_frame_word((5 << 18) | 7);
        assert_eq!(discriminant, 5);
        assert_eq!(length, 7);
        let (discriminant, length) = Record::parse_frame_word(0xFFFF_FFFF);
        assert_eq!(discriminant, 0x3FFF);
        assert_eq!(length, 0x3FFFF);
    }

    #[test]
    fn test_read_two_records() {
        let mut bytes = frame(3, &[1, 2, 3, 4, 5, 6, 7, 8]);
        bytes.extend(frame(9, &[]));
        let mut reader = RecordReader::new(Cursor::new(bytes));

        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.discriminant, 3);
        assert_eq!(first.length, 3);
        assert_eq!(first.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.discriminant, 9);
        assert!(second.payload.is_empty());

        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
        assert_eq!(reader.bytes_read(), 16);
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = frame(3, &[0; 12]);
        bytes.truncate(bytes.len() - 2);
        let mut reader = RecordReader::new(Cursor::new(bytes));
        match reader.next_record() {
            Err(RecordError::TruncatedRecord {
                expected,
                available,
            }) => {
                assert_eq!(expected, 12);
                assert_eq!(available, 10);
            }
            other => panic!("Expected truncated record, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_frame_word() {
        let mut reader = RecordReader::new(Cursor::new(vec![1u8, 0]));
        assert!(matches!(
            reader.next_record(),
            Err(RecordError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn test_zero_length_is_corrupt() {
        let mut reader = RecordReader::new(Cursor::new(vec![0u8, 0, 0x0C, 0]));
        assert!(matches!(
            reader.next_record(),
            Err(RecordError::CorruptFraming { length: 0, .. })
        ));
    }

    #[test]
    fn test_ceiling() {
        let bytes = frame(3, &[0; 40]);
        let mut reader = RecordReader::with_ceiling(Cursor::new(bytes), 8);
        assert!(matches!(
            reader.next_record(),
            Err(RecordError::CorruptFraming {
                length: 11,
                ceiling: 8
            })
        ));
    }

    #[test]
    fn test_run_header() {
        let xml = b"<plist></plist>\0";
        let mut payload = (xml.len() as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(xml);
        let record = Record {
            discriminant: 0,
            length: (payload.len() / WORD_SIZE + 1) as u32,
            payload,
        };
        assert!(record.is_run_header());
        let header = RunHeader::try_from(&record).unwrap();
        assert_eq!(header.xml, "<plist></plist>");
    }

    #[test]
    fn test_iterator() {
        let mut bytes = frame(1, &[0; 4]);
        bytes.extend(frame(2, &[0; 4]));
        let reader = RecordReader::new(Cursor::new(bytes));
        let discriminants: Vec<u16> = reader.map(|r| r.unwrap().discriminant).collect();
        assert_eq!(discriminants, vec![1, 2]);
    }
}
