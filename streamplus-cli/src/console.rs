//! Console side of the interactive login: prints the authorization URL,
//! optionally opens it, and waits for the user to paste the code.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use streamplus_common::Error;
use streamplus_common::models::AuthorizationPrompt;
use streamplus_common::traits::AuthorizationCodeProvider;

/// Shares stdin with the command loop: while a code request is pending,
/// the next line typed goes to it instead of being run as a command.
pub struct ConsolePrompt {
    open_browser: bool,
    pending: Mutex<Option<oneshot::Sender<String>>>,
}

impl ConsolePrompt {
    pub fn new(open_browser: bool) -> Self {
        Self {
            open_browser,
            pending: Mutex::new(None),
        }
    }

    /// Returns the line back if no code request is waiting for it.
    pub fn route(&self, line: String) -> Option<String> {
        match self.pending.lock().take() {
            Some(tx) => {
                // receiver gone means the connect attempt was abandoned; treat as a command
                tx.send(line).err()
            }
            None => Some(line),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[async_trait]
impl AuthorizationCodeProvider for ConsolePrompt {
    async fn request_authorization_code(&self, prompt: AuthorizationPrompt) -> Result<String, Error> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);

        println!("{}", prompt.message);
        println!("  {}", prompt.url);
        if self.open_browser {
            if let Err(err) = open::that(&prompt.url) {
                println!("Could not open browser automatically: {:?}", err);
            }
        }
        println!("Paste the code shown after authorizing as the {} account:", prompt.role);

        rx.await
            .map_err(|_| Error::AuthorizationCode("console closed before a code was entered".into()))
    }
}
