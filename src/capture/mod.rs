mod identity_capture;

pub use identity_capture::IdentityCapture;
