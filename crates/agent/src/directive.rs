//! The system directive: tool-selection policy and safety rules.

use vcassist_core::tool::ToolRegistry;

/// Name of the retrieval tool, the one tool that does not touch live state.
pub const RUNBOOK_TOOL: &str = "search_runbooks";

const PREAMBLE: &str = "You are an expert VMware vCenter administrator assistant for the operations team.";

const GUIDANCE: &str = "\
How to choose:
- Questions about current state (what is running, power status, resource usage, alarms) → use the vCenter tools.
- Questions about procedures, how-to, policy, SLAs, escalation, or maintenance windows → use search_runbooks.
- Questions that need both (e.g. \"host X is alarming, what is the procedure?\") → call both and combine the results.

Always:
- Confirm the exact vm_name before any destructive action (power off, restart). Only pass confirm=true when the operator has clearly asked for it.
- Power, restart, and snapshot tools start a vCenter task and return immediately. Say the task was started; never claim it has completed.
- When you use runbook content, cite the source it came from.
- Be concise and direct. The operations team wants answers, not essays.";

/// Build the directive for a catalog, listing its live tools by name.
pub fn compose(tools: &ToolRegistry) -> String {
    let live: Vec<&str> = tools
        .names()
        .into_iter()
        .filter(|name| *name != RUNBOOK_TOOL)
        .collect();

    let mut directive = String::from(PREAMBLE);
    directive.push_str("\n\nYou have two kinds of tools:\n");
    if live.is_empty() {
        directive.push_str("1. vCenter tools: none are available in this session.\n");
    } else {
        directive.push_str(&format!(
            "1. vCenter tools (LIVE data from the environment): {}\n",
            live.join(", ")
        ));
    }
    directive.push_str(
        "2. search_runbooks: searches the operational runbooks, DR procedures, \
         troubleshooting guides, SLAs, and documentation.\n\n",
    );
    directive.push_str(GUIDANCE);
    directive
}
