//! Line-oriented command parsing.
//!
//! Plain text is a message for the active node; lines starting with `/` are
//! commands.

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send to the active node.
    Send(String),
    /// Branch off the active node from highlighted text.
    Branch(String),
    /// One-sentence explanation of a term.
    Explain(String),
    /// Make a node active, by label or id prefix.
    Focus(String),
    /// Send to the side panel branch.
    Panel(String),
    Promote,
    Close,
    /// Print the graph as a tree, optionally cut off below a depth.
    Graph(Option<u32>),
    /// Print the graph snapshot as JSON.
    Json,
    /// Print the active and side panel conversations.
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("/{0}: expected a number, got '{1}'")]
    InvalidNumber(&'static str, String),
}

pub const HELP: &str = "\
<text>            send to the active conversation
/branch <text>    branch off the active node from highlighted text
/explain <term>   one-sentence explanation (cached)
/focus <query>    make a node active (label, label prefix or id prefix)
/panel <text>     send to the side panel branch
/promote          make the side panel branch active
/close            dismiss the side panel
/graph [depth]    show the graph as a tree, down to depth if given
/json             dump the graph snapshot as JSON
/show             show the active and side panel conversations
/help             this text
/quit             exit";

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let required = |name: &'static str| {
            if arg.is_empty() {
                Err(CommandError::MissingArgument(name))
            } else {
                Ok(arg.to_string())
            }
        };

        let command = match name {
            "branch" => Self::Branch(required("branch")?),
            "explain" => Self::Explain(required("explain")?),
            "focus" => Self::Focus(required("focus")?),
            "panel" => Self::Panel(required("panel")?),
            "promote" => Self::Promote,
            "close" => Self::Close,
            "graph" if arg.is_empty() => Self::Graph(None),
            "graph" => Self::Graph(Some(
                arg.parse()
                    .map_err(|_| CommandError::InvalidNumber("graph", arg.to_string()))?,
            )),
            "json" => Self::Json,
            "show" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_send() {
        assert_eq!(
            Command::parse("  Explain entropy \n").unwrap(),
            Some(Command::Send("Explain entropy".into()))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            Command::parse("/branch the second law").unwrap(),
            Some(Command::Branch("the second law".into()))
        );
        assert_eq!(
            Command::parse("/explain   photosynthesis").unwrap(),
            Some(Command::Explain("photosynthesis".into()))
        );
        assert_eq!(
            Command::parse("/focus 0190").unwrap(),
            Some(Command::Focus("0190".into()))
        );
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::parse("/promote").unwrap(), Some(Command::Promote));
        assert_eq!(Command::parse("/exit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("/graph").unwrap(), Some(Command::Graph(None)));
        assert_eq!(Command::parse("/graph 1").unwrap(), Some(Command::Graph(Some(1))));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Command::parse("/branch"),
            Err(CommandError::MissingArgument("branch"))
        );
        assert_eq!(
            Command::parse("/panel   "),
            Err(CommandError::MissingArgument("panel"))
        );
        assert_eq!(
            Command::parse("/frobnicate now"),
            Err(CommandError::Unknown("frobnicate".into()))
        );
        assert_eq!(
            Command::parse("/graph deep"),
            Err(CommandError::InvalidNumber("graph", "deep".into()))
        );
        assert_eq!(
            Command::parse("/graph -1"),
            Err(CommandError::InvalidNumber("graph", "-1".into()))
        );
    }
}
