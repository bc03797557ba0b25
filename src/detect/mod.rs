mod result;

pub use result::{BoundingBox, Detection, DetectionResult};
