//! `newsdesk policies` — Validate and list the system policies.

use newsdesk_agent::{Policy, PolicyTable};

pub fn run(full: bool) -> Result<(), Box<dyn std::error::Error>> {
    let table = PolicyTable::builtin();
    table.validate()?;

    println!("System policies ({} total, all valid)\n", Policy::ALL.len());

    for policy in Policy::ALL {
        let text = table.get(policy);
        let placeholder = policy
            .placeholder()
            .map(|p| format!("  takes {p}"))
            .unwrap_or_default();
        println!(
            "  {:<15} {} chars{placeholder}",
            policy.as_str(),
            text.chars().count()
        );

        if full {
            for line in text.lines() {
                println!("      {line}");
            }
            println!();
        }
    }

    Ok(())
}
