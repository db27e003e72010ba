//! Terminal front end for a branchchat kernel.
//!
//! [`Repl`] turns parsed [`Command`]s into kernel calls and returns the lines
//! to print. The binary owns stdin/stdout; everything here is testable
//! without a terminal.

pub mod command;
pub mod tree;

pub use command::{Command, CommandError, HELP};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use branchchat_kernel::config::CONFIG_FILE_NAME;
use branchchat_kernel::{Kernel, KernelConfig, RejectReason, SendOutcome, load_config_file};
use branchchat_types::{Message, NodeId, Role};

/// `$XDG_CONFIG_HOME/branchchat/branchchat.rhai`, or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("branchchat").join(CONFIG_FILE_NAME))
}

/// Load config from `explicit`, else the default path if it exists, else
/// defaults. `endpoint` overrides whatever was loaded.
pub fn resolve_config(explicit: Option<&Path>, endpoint: Option<&str>) -> Result<KernelConfig> {
    let config = match explicit {
        Some(path) => load_config_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_config_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            _ => KernelConfig::default(),
        },
    };
    Ok(match endpoint {
        Some(endpoint) => config.with_endpoint(endpoint),
        None => config,
    })
}

/// What to print after a command, and whether to stop.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Response {
    fn lines(lines: Vec<String>) -> Self {
        Self { lines, quit: false }
    }

    fn line(line: impl Into<String>) -> Self {
        Self::lines(vec![line.into()])
    }
}

/// Drives one kernel from parsed commands.
#[derive(Debug, Clone)]
pub struct Repl {
    kernel: Arc<Kernel>,
}

impl Repl {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Run one command.
    pub async fn execute(&self, command: Command) -> Result<Response> {
        let kernel = &self.kernel;
        let response = match command {
            Command::Send(text) => {
                let node = kernel.session().active;
                let outcome = kernel.send_message(node, &text).await?;
                self.reply(node, outcome)
            }
            Command::Panel(text) => {
                let Some(panel) = kernel.session().side_panel else {
                    return Ok(Response::line("no side panel open"));
                };
                let outcome = kernel.send_message(panel.node, &text).await?;
                self.reply(panel.node, outcome)
            }
            Command::Branch(text) => {
                let branch = kernel.create_branch_from_active(&text)?;
                let outcome = branch
                    .first_exchange
                    .await
                    .context("first exchange task failed")??;
                let mut lines = vec![format!("branched {} → side panel", branch.node.short())];
                lines.extend(self.reply(branch.node, outcome).lines);
                Response::lines(lines)
            }
            Command::Explain(term) => {
                let explanation = kernel.explain(&term).await;
                Response::line(format!("{term}: {explanation}"))
            }
            Command::Focus(query) => {
                let node = kernel.resolve_node(&query)?;
                kernel.focus_node(node)?;
                Response::line(format!("focused {}", self.describe(node)))
            }
            Command::Promote => match kernel.promote_side_panel() {
                Some(node) => Response::line(format!("promoted {}", self.describe(node))),
                None => Response::line("no side panel open"),
            },
            Command::Close => match kernel.close_side_panel() {
                Some(panel) => Response::line(format!("closed {}", self.describe(panel.node))),
                None => Response::line("no side panel open"),
            },
            Command::Graph(depth) => Response::lines(tree::format_graph_tree(&kernel.snapshot(), depth)),
            Command::Json => Response::line(serde_json::to_string_pretty(&kernel.snapshot())?),
            Command::Show => self.show(),
            Command::Help => Response::lines(HELP.lines().map(str::to_string).collect()),
            Command::Quit => Response {
                lines: Vec::new(),
                quit: true,
            },
        };
        Ok(response)
    }

    fn reply(&self, node: NodeId, outcome: SendOutcome) -> Response {
        match outcome {
            SendOutcome::Rejected(RejectReason::Empty) => Response::default(),
            SendOutcome::Rejected(RejectReason::InFlight) => {
                Response::line(format!("{} is still waiting on a reply", self.describe(node)))
            }
            SendOutcome::Delivered | SendOutcome::Fallback => {
                let history = self.kernel.conversation(node).unwrap_or_default();
                match history.last() {
                    Some(message) => Response::line(format_message(message)),
                    None => Response::default(),
                }
            }
        }
    }

    fn show(&self) -> Response {
        let session = self.kernel.session();
        let mut lines = vec![format!("── {} ──", self.describe(session.active))];
        lines.extend(
            self.kernel
                .conversation(session.active)
                .unwrap_or_default()
                .iter()
                .map(format_message),
        );
        if let Some(panel) = session.side_panel {
            lines.push(format!("── side panel: {} ──", self.describe(panel.node)));
            lines.extend(
                self.kernel
                    .conversation(panel.node)
                    .unwrap_or_default()
                    .iter()
                    .map(format_message),
            );
        }
        Response::lines(lines)
    }

    fn describe(&self, node: NodeId) -> String {
        let label = self.kernel.node(node).map(|n| n.label);
        format!("{} ({})", node.display_or(label.as_deref()), node.short())
    }
}

/// One transcript line.
pub fn format_message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you: {}", message.content),
        Role::Assistant => format!("assistant: {}", message.content),
    }
}
