use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use contentpipe_lib::tool::RecoveryResponse;

/// True if both stdin and stderr are attached to a terminal.
pub fn is_interactive() -> bool {
  io::stdin().is_terminal() && io::stderr().is_terminal()
}

/// Ask the user where the converter lives after `attempted` could not be started.
///
/// Non-interactive sessions, an empty answer or a read error cancel the recovery.
pub fn locate_tool(tool: &str, attempted: &Path, interactive: bool) -> RecoveryResponse {
  if !interactive {
    warn!(tool = %tool, path = ?attempted, "converter not found and no terminal to ask");
    return RecoveryResponse::Cancelled;
  }

  match ask_path(tool, attempted, &mut io::stdin().lock(), &mut io::stderr()) {
    Ok(Some(path)) => RecoveryResponse::Selected(path),
    Ok(None) => RecoveryResponse::Cancelled,
    Err(e) => {
      warn!(error = %e, "could not read converter path");
      RecoveryResponse::Cancelled
    }
  }
}

fn ask_path(
  tool: &str,
  attempted: &Path,
  input: &mut impl BufRead,
  prompt: &mut impl Write,
) -> io::Result<Option<PathBuf>> {
  writeln!(prompt, "Could not find {} at location: '{}'", tool, attempted.display())?;
  write!(prompt, "Path to {} (leave empty to cancel): ", tool)?;
  prompt.flush()?;

  let mut line = String::new();
  input.read_line(&mut line)?;
  let answer = line.trim().trim_matches('"');
  if answer.is_empty() {
    return Ok(None);
  }
  Ok(Some(PathBuf::from(answer)))
}
