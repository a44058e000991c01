//! Binary entrypoint for the chat server.

use std::process::ExitCode;

use ai_chat_server::start_chat_server;

/// Load configuration from the environment and serve until Ctrl-C.
fn main() -> ExitCode {
    start_chat_server::run()
}
