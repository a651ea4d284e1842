use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

use goblin_runtime::{Proposal, RitualPrompt};

/// Asks on the controlling terminal.  End of input counts as "no".
pub(crate) struct TerminalPrompt;

#[async_trait]
impl RitualPrompt for TerminalPrompt {
    async fn confirm(&self, proposal: &Proposal) -> bool {
        let proposal = proposal.clone();
        let answer = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            ask(&mut stdin.lock(), &mut stdout, &proposal)
        })
        .await;

        match answer {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(err)) => {
                warn!(error = %err, "could not read ritual answer");
                false
            }
            Err(err) => {
                warn!(error = %err, "ritual prompt task failed");
                false
            }
        }
    }
}

fn ask(input: &mut impl BufRead, output: &mut impl Write, proposal: &Proposal) -> io::Result<bool> {
    writeln!(output)?;
    writeln!(output, "── ritual: {} ──", proposal.scope)?;
    writeln!(output, "{}", proposal.message)?;
    loop {
        write!(output, "commit this? [y/n] ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None => writeln!(output, "please answer y or n")?,
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
