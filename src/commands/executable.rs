use crate::frame::Frame;

/// A parsed command ready to run. Commands are pure: the reply depends only on the arguments.
pub trait Executable {
    fn exec(self) -> Frame;
}
