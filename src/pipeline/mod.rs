pub mod collaborators;
mod frame_pipeline;
pub mod window;

pub use collaborators::{
    BoundingBox, FaceMatch, Frame, IdentityMatcher, PostureAssessment, PostureAssessor,
    SnapshotSink,
};
pub use frame_pipeline::{FrameDecision, FramePipeline};
pub use window::{derive_group, AllowedGroupWindow, Authorization, AuthorizationFilter, UNKNOWN_IDENTITY};
