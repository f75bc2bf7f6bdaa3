pub mod vision;

pub use vision::VisionClient;
