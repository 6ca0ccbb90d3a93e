use std::io::{BufRead, Write};

use scr_deploy::ConsentProvider;

/// Asks y/N questions on the terminal.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConsent {
    assume_yes: bool,
}

impl TerminalConsent {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ConsentProvider for TerminalConsent {
    async fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        if self.assume_yes {
            tracing::info!(question, "Confirmed by --yes");
            return Ok(true);
        }

        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            write!(stdout, "{question} [y/N] ")?;
            stdout.flush()?;

            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok::<_, anyhow::Error>(is_yes(&answer))
        })
        .await?
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
