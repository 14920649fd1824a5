//! # orca_decoder
//!
//! orca_decoder decodes the binary run files written by the ORCA data acquisition, written
//! in Rust. It takes a stream of framed records from the digitizers and slow control
//! pollers of a detector readout chain and turns them into one decoded table per module,
//! with optional reconstruction of multirate (presummed) digitizer waveforms.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI decoder use `cargo install --path ./orca_decoder_cli` from
//! the top level repository. The binary will be installed to your cargo install location
//! (typically something like `~/.cargo/bin/`). To use the CLI see the `orca_decoder_cli`
//! README.
//!
//! ## Supported Modules
//!
//! - Gretina4M waveform digitizer
//! - SIS3302 digitizer, including energy filter buffers and buffer wrap mode
//! - MJD preamplifier monitor (16 ADC channels)
//! - iSeg high voltage card (8 channels)
//!
//! Records from any other data id are skipped using the length in their frame word. The
//! record with data id 0 is the run header; its XML text is kept but not interpreted.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_files:
//! - /data/run_1234
//! channel_table_path: null
//! decoders:
//! - data_id: 3
//!   module: Gretina4M
//! - data_id: 4
//!   module: Sis3302
//! - data_id: 5
//!   module: MjdPreamp
//! - data_id: 6
//!   module: IsegHv
//! channel_filter: null
//! max_record_words: 262143
//! n_threads: 1
//! reconstruction:
//!   sample_period_ns: 10.0
//!   wf_length: 2018
//!   kernel_length: 20
//!   baseline_tolerance:
//!     below: 4
//!     above: 0
//!   flat_top_tolerance:
//!     below: 2
//!     above: 0
//! ```
//!
//! - `decoders` maps the data ids of a run to module classes. Data ids are assigned by
//! ORCA per run and listed in the run header.
//! - `channel_filter` is an optional list of packed channel addresses
//! (`crate << 9 | card << 4 | channel`). Digitizer events from any other channel are
//! skipped. If `channel_table_path` is given, channels not enabled in the table are also
//! skipped.
//! - `max_record_words` is the sanity ceiling on a record length. A longer record is
//! treated as corrupt framing and ends the file.
//! - `n_threads` is the number of workers the file list is divided amongst. Must be at
//! least 1.
//!
//! ### Channel Table Format
//!
//! The channel table is a CSV file flattened from the digitizer settings of the run
//! header. The first line is a header and is skipped. The columns are as follows:
//!
//! ```csv
//! crate,card,channel,enabled,prerecnt,postrecnt,ftcnt,mrpsrt,mrpsdv
//! ```
//!
//! `mrpsrt` and `mrpsdv` are the multirate sum and divider register values, not the
//! factors. The sum factor is 2, 4, 8, 10 for register values 0 to 3, and the divider is
//! two to the power of its register value. Both registers are two bits wide, so a table
//! with a value above 3 is rejected.
//!
//! ## Output
//!
//! Each decoded file is handed to the caller as a [process::DecodedFile] as soon as it is
//! done; writing the tables out is up to the caller. The CLI writes a log file, `orca_decoder.log`, with
//! the status of each file, any integrity warnings, and a per-module summary of decoded,
//! skipped, warned, and failed records. It is not advised to delete the log files.
pub mod channel_address;
pub mod channel_table;
pub mod config;
pub mod constants;
pub mod decoders;
pub mod error;
pub mod process;
pub mod reconstruction;
pub mod record;
pub mod registry;
pub mod summary;
pub mod worker_status;
