mod completer;

pub use completer::*;
