mod chat_request;
mod run_record;
mod stream_item;

pub use chat_request::*;
pub use run_record::*;
pub use stream_item::*;
