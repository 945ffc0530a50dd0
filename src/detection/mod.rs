/// Detection module
///
/// Locates target faces in a frame and decides whether the aim point is on
/// one of them.
///
/// ## Architecture
///
/// ```text
/// ProcessingJob
///   ├── Detector (external model)      → [Detection]
///   │     └── HttpDetector (JPEG over HTTP)
///   └── classify(detections, aim)      → HitResult
///         ├── Hit        crop + aim relative to the crop
///         ├── Miss       aim on no qualifying box
///         └── Unresolved detector unavailable
/// ```

pub mod classifier;
pub mod detector;
pub mod http;

// Re-export commonly used types
pub use classifier::{classify, Hit, HitResult, HitStatus};
pub use detector::{BoundingBox, Detection, Detector};
pub use http::HttpDetector;
