//! Member segmentation: static member lists and dynamic, criteria-based
//! segments evaluated against the member directory.

pub mod builder;
pub mod criteria;
pub mod service;

pub use builder::CriteriaBuilder;
pub use criteria::{MemberProfile, SegmentCriteria};
pub use service::{CreateSegment, Segment, SegmentService, SegmentType, UpdateSegment};
