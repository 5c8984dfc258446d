mod azure_openai_completer;
mod mock_completer;

pub use azure_openai_completer::*;
pub use mock_completer::*;
