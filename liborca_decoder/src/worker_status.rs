/// Bar color tells the UI what a worker is doing
#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN, // decoding
    MAGENTA, // file skipped
    RED,     // stream ended on a framing error
    GREEN,   // file finished
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub file_name: String,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, file_name: &str, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            file_name: file_name.to_string(),
            worker_id,
            color,
        }
    }
}
