use clap::Args;
use color_eyre::eyre::Result;
use ironfly_common::states::{next_state, TRANSITIONS};
use ironfly_common::StateMachine;

#[derive(Args, Debug)]
pub struct StatesArgs {
    /// Only show what can happen from this state
    #[arg(long)]
    pub from: Option<String>,
}

pub fn run(args: StatesArgs) -> Result<()> {
    match args.from {
        Some(state) => {
            let machine = StateMachine::initialize(&state)?;
            print!("{}", describe_state(machine));
        }
        None => print!("{}", transition_table()),
    }
    Ok(())
}

fn transition_table() -> String {
    let mut out = String::new();
    for (from, event, to) in TRANSITIONS {
        out.push_str(&format!("{:<15} --{:<8}--> {}\n", from.as_str(), event.as_str(), to));
    }
    out
}

fn describe_state(machine: StateMachine) -> String {
    let state = machine.current_state();
    let mut out = format!("state: {}\n", state);
    out.push_str(&format!("stable: {}\n", state.is_stable()));
    if let Some(target) = state.target() {
        out.push_str(&format!("target: {}\n", target));
    }
    let events = machine.legal_events();
    if events.is_empty() {
        out.push_str("no transitions\n");
    }
    for event in events {
        if let Some(to) = next_state(state, event) {
            out.push_str(&format!("  {:<8} -> {}\n", event.as_str(), to));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_every_edge() {
        let table = transition_table();
        assert_eq!(table.lines().count(), TRANSITIONS.len());
        assert!(table.contains("available       --deploy  --> deploying"));
    }

    #[test]
    fn test_describe_unstable_state() {
        let out = describe_state(StateMachine::initialize("clean-wait").unwrap());
        assert!(out.contains("stable: false"));
        assert!(out.contains("target: available"));
        assert!(out.contains("abort    -> clean-failed"));
    }

    #[test]
    fn test_describe_terminal_state() {
        let out = describe_state(StateMachine::initialize("deleted").unwrap());
        assert!(out.contains("no transitions"));
    }
}
