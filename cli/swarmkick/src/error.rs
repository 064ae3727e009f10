//! Error display for the CLI.

use colored::Colorize;
use swarmkick_engine::EngineError;
use swarmkick_rebalance::RebalanceError;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    let Some(rebalance_err) = err.downcast_ref::<RebalanceError>() else {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        if let Some(EngineError::InvalidEndpoint(_)) = err.downcast_ref::<EngineError>() {
            print_hint("Use unix:///path/to/docker.sock, tcp://host:port or http(s)://host:port.");
        }
        return;
    };

    // The rebalance message already carries its source chain.
    eprintln!("{} {}", "Error:".red().bold(), rebalance_err);

    if let Some(command) = restore_command(rebalance_err) {
        eprintln!(
            "\n{} {}",
            "Service may be left over-provisioned.".red().bold(),
            format!("Restore it with `{command}`.").red()
        );
    }

    if let Some(hint) = hint(rebalance_err.root()) {
        print_hint(&hint);
    }
}

fn print_hint(hint: &str) {
    eprintln!("\n{}", format!("Hint: {hint}").yellow());
}

/// Manual fix for a run that left extra replicas behind.
fn restore_command(err: &RebalanceError) -> Option<String> {
    match err {
        RebalanceError::Aborted {
            service,
            replicas,
            compensated: false,
            ..
        } => Some(format!("docker service scale {service}={replicas}")),
        _ => None,
    }
}

fn hint(err: &RebalanceError) -> Option<String> {
    match err {
        RebalanceError::NotFound(_) => {
            Some("Check the service name with `docker service ls`.".to_string())
        }
        RebalanceError::Connectivity { .. } => Some(
            "Check that the engine is reachable at --docker-host (or DOCKER_HOST). \
             With --cluster every node must expose its engine on --node-port."
                .to_string(),
        ),
        RebalanceError::Conflict { .. } => {
            Some("The service was updated by someone else. Run swarmkick again.".to_string())
        }
        RebalanceError::Timeout { service, .. } => Some(format!(
            "Check `docker service ps {service}` for placement or image pull errors, \
             or raise --timeout."
        )),
        RebalanceError::Termination { host, .. } => {
            Some(format!("The container may have exited already. Check `docker ps -a` on {host}."))
        }
        RebalanceError::NotReplicated(_) => {
            Some("Global services run one task per node and cannot be rebalanced.".to_string())
        }
        RebalanceError::Cancelled { .. } | RebalanceError::Aborted { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use swarmkick_rebalance::Phase;

    use super::*;

    fn aborted(compensated: bool) -> RebalanceError {
        RebalanceError::Aborted {
            service: "web".to_string(),
            replicas: 3,
            phase: Phase::ScaledUp,
            compensated,
            source: Box::new(RebalanceError::Timeout {
                service: "web".to_string(),
                elapsed: Duration::from_secs(600),
                polls: 120,
            }),
        }
    }

    #[test]
    fn test_restore_command_only_when_dirty() {
        assert_eq!(
            restore_command(&aborted(false)).as_deref(),
            Some("docker service scale web=3")
        );
        assert_eq!(restore_command(&aborted(true)), None);
        assert_eq!(
            restore_command(&RebalanceError::NotFound("web".to_string())),
            None
        );
    }

    #[test]
    fn test_hint_uses_root_cause() {
        let err = aborted(true);

        let hint = hint(err.root()).unwrap();

        assert!(hint.contains("docker service ps web"));
    }

    #[test]
    fn test_cancel_has_no_hint() {
        let err = RebalanceError::Cancelled {
            service: "web".to_string(),
        };
        assert!(hint(&err).is_none());
    }
}
