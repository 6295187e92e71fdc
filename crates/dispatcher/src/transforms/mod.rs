//! Item transforms applied to a ready batch before posting

mod status;

use std::sync::Arc;

use contracts::{ItemTransform, TransformKind};

pub use status::StatusReducer;

/// Build the transform selected in configuration
pub fn from_kind(kind: TransformKind) -> Option<Arc<dyn ItemTransform>> {
    match kind {
        TransformKind::None => None,
        TransformKind::Status => Some(Arc::new(StatusReducer)),
    }
}
