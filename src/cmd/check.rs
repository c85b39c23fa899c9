use clap::Args;
use color_eyre::eyre::Result;
use ironfly_common::states::next_state;
use ironfly_common::{check_provision_request, NodeRecord, ProvisionRequest, ProvisionState};
use tracing::debug;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Current provision state of the node
    #[arg(long)]
    pub state: String,

    /// Requested verb: active, rebuild, deleted, manage, provide, inspect or abort
    #[arg(long)]
    pub verb: String,

    /// The node is in maintenance mode
    #[arg(long, default_value_t = false)]
    pub maintenance: bool,

    /// Host currently holding the node's lock
    #[arg(long)]
    pub reserved_by: Option<String>,

    /// The request carries a config drive
    #[arg(long, default_value_t = false)]
    pub configdrive: bool,

    /// Negotiated API minor version (1.<n>)
    #[arg(long)]
    pub api_minor: Option<u32>,
}

/// Evaluate the request and print the outcome. Returns false if it was rejected.
pub fn run(args: CheckArgs) -> Result<bool> {
    let (accepted, report) = evaluate(&args)?;
    println!("{}", report);
    Ok(accepted)
}

fn evaluate(args: &CheckArgs) -> Result<(bool, String)> {
    let state: ProvisionState = args.state.parse()?;

    let mut node = NodeRecord::new("fake").with_provision_state(state);
    if args.maintenance {
        node = node.with_maintenance("set from the command line");
    }
    node.reservation = args.reserved_by.clone();

    let mut request = ProvisionRequest::new(args.verb.as_str());
    if args.configdrive {
        request = request.with_configdrive("H4sICDwpFl0AA2NvbmZpZ2RyaXZl");
    }
    if let Some(minor) = args.api_minor {
        request = request.with_api_minor(minor);
    }
    debug!(?request, state = %state, "Checking provisioning request");

    Ok(match check_provision_request(&node, &request) {
        Ok(event) => {
            let mut report = format!("accepted: {} ({})", args.verb, event);
            if let Some(to) = next_state(state, event) {
                report.push_str(&format!("\n{} -> {}", state, to));
                if let Some(target) = to.target() {
                    report.push_str(&format!(" (target {})", target));
                }
            }
            (true, report)
        }
        Err(e) => (false, format!("rejected: {}", e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(state: &str, verb: &str) -> CheckArgs {
        CheckArgs {
            state: state.to_string(),
            verb: verb.to_string(),
            maintenance: false,
            reserved_by: None,
            configdrive: false,
            api_minor: None,
        }
    }

    #[test]
    fn test_accepted_reports_transition() {
        let (accepted, report) = evaluate(&args("available", "active")).unwrap();
        assert!(accepted);
        assert!(report.contains("available -> deploying (target active)"));
    }

    #[test]
    fn test_reserved_node_reports_holder() {
        let mut a = args("available", "provide");
        a.reserved_by = Some("conductor-9".to_string());
        let (accepted, report) = evaluate(&a).unwrap();
        assert!(!accepted);
        assert!(report.contains("locked by host conductor-9"));
    }

    #[test]
    fn test_version_gate() {
        let mut a = args("manageable", "inspect");
        a.api_minor = Some(5);
        let (accepted, report) = evaluate(&a).unwrap();
        assert!(!accepted);
        assert!(report.starts_with("rejected: Not acceptable"));
    }

    #[test]
    fn test_unknown_state_is_an_error() {
        assert!(evaluate(&args("levitating", "active")).is_err());
    }
}
