use clap::Subcommand;

use crate::connector::{DEFAULT_PORT, DEFAULT_SERVER_URL};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "Assume the role of a friendly advisor";

#[derive(Subcommand)]
pub enum Commands {
    /// Serve `POST /chat`, streaming each reply as it is generated
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Bind to 0.0.0.0 instead of 127.0.0.1, exposing the server on all network interfaces
        #[arg(long)]
        public: bool,
    },

    /// Run one request in-process and print the reply as it streams
    Chat {
        message: String,

        #[arg(short, long, default_value = DEFAULT_SYSTEM_MESSAGE)]
        system: String,
    },

    /// Send one request to a running server and print the streamed reply
    Ask {
        message: String,

        #[arg(short, long, default_value = DEFAULT_SYSTEM_MESSAGE)]
        system: String,

        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        url: String,
    },
}
