mod scoped_timer;

pub use scoped_timer::*;
