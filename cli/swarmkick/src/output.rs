//! Output formatting.

use colored::Colorize;
use serde::Serialize;
use swarmkick_rebalance::{ContainerInstance, Node, Outcome};
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

#[derive(Debug, Tabled)]
struct ContainerRow {
    #[tabled(rename = "CONTAINER")]
    id: String,

    #[tabled(rename = "NAME")]
    name: String,

    #[tabled(rename = "HOST")]
    host: String,

    #[tabled(rename = "CREATED")]
    created: String,
}

impl From<&ContainerInstance> for ContainerRow {
    fn from(container: &ContainerInstance) -> Self {
        Self {
            id: short_id(&container.id).to_string(),
            name: container.name.clone().unwrap_or_else(|| "-".to_string()),
            host: container.host.to_string(),
            created: container.created.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

#[derive(Debug, Tabled)]
struct NodeRow {
    #[tabled(rename = "HOSTNAME")]
    hostname: String,

    #[tabled(rename = "ADDRESS")]
    addr: String,

    #[tabled(rename = "STATE")]
    state: String,

    #[tabled(rename = "AVAILABILITY")]
    availability: String,

    #[tabled(rename = "ROLE")]
    role: String,

    #[tabled(rename = "MESSAGE")]
    message: String,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        let role = if node.leader {
            format!("{} (leader)", node.role)
        } else {
            node.role.clone()
        };

        Self {
            hostname: node.hostname.clone(),
            addr: node.addr.clone().unwrap_or_else(|| "-".to_string()),
            state: node.state.clone(),
            availability: node.availability.clone(),
            role,
            message: node.message.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Engine container IDs are shown truncated, as `docker ps` does.
fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Print the result of a run.
pub fn print_outcome(outcome: &Outcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", format_json(outcome)),
        OutputFormat::Table => match outcome {
            Outcome::Rebalanced(report) => {
                print_success(&format!(
                    "Rebalanced '{}': replaced its oldest container, {} replicas",
                    report.service, report.replicas
                ));
                print_info(&format!(
                    "New replica running after {} check(s), {} -> {} running",
                    report.polls, report.baseline_running, report.converged_running
                ));
                println!("{}", Table::new([ContainerRow::from(&report.terminated)]));
            }
            Outcome::NoRunningInstances(diagnostic) => {
                print_warning(&format!(
                    "No containers of '{}' are running; nothing was changed.",
                    diagnostic.service
                ));
                if diagnostic.nodes.is_empty() {
                    println!("{}", "No nodes found.".dimmed());
                } else {
                    let rows: Vec<NodeRow> = diagnostic.nodes.iter().map(NodeRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        },
    }
}

fn format_json<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use swarmkick_rebalance::{DiagnosticReport, HostTarget, RebalanceReport, RunState};

    use super::*;

    fn container() -> ContainerInstance {
        ContainerInstance {
            id: "3f9a2c7e1b0d44c6a8e5".to_string(),
            name: Some("web.2.k1x9".to_string()),
            image: "nginx:1.25".to_string(),
            state: RunState::Running,
            host: HostTarget::Node {
                addr: "10.0.0.3".to_string(),
            },
            created: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_container_row() {
        let row = ContainerRow::from(&container());

        assert_eq!(row.id, "3f9a2c7e1b0d");
        assert_eq!(row.name, "web.2.k1x9");
        assert_eq!(row.host, "10.0.0.3");
        assert_eq!(row.created, "2024-05-01 08:30:00 UTC");
    }

    #[test]
    fn test_short_id_keeps_short_ids() {
        assert_eq!(short_id("c1"), "c1");
    }

    #[test]
    fn test_node_row_marks_leader_and_missing_fields() {
        let node = Node {
            id: "n1".to_string(),
            hostname: "manager-1".to_string(),
            addr: None,
            state: "ready".to_string(),
            availability: "active".to_string(),
            role: "manager".to_string(),
            leader: true,
            reachability: Some("reachable".to_string()),
            message: None,
        };

        let row = NodeRow::from(&node);

        assert_eq!(row.role, "manager (leader)");
        assert_eq!(row.addr, "-");
        assert_eq!(row.message, "-");
    }

    #[test]
    fn test_json_outcome_is_tagged() {
        let rebalanced = Outcome::Rebalanced(RebalanceReport {
            service: "web".to_string(),
            replicas: 3,
            baseline_running: 3,
            converged_running: 4,
            polls: 2,
            terminated: container(),
            final_version: 12,
        });
        let value: serde_json::Value = serde_json::from_str(&format_json(&rebalanced)).unwrap();
        assert_eq!(value["outcome"], "rebalanced");
        assert_eq!(value["terminated"]["host"]["kind"], "node");

        let diagnostic = Outcome::NoRunningInstances(DiagnosticReport {
            service: "idle".to_string(),
            replicas: Some(2),
            nodes: Vec::new(),
        });
        let value: serde_json::Value = serde_json::from_str(&format_json(&diagnostic)).unwrap();
        assert_eq!(value["outcome"], "no_running_instances");
        assert_eq!(value["replicas"], 2);
    }
}
