//! Static model-selection table
//!
//! Keyed on (slash command, model set). The `heavy` set upgrades the
//! judgment-heavy commands; mechanical commands (classification,
//! branch naming) stay on the base model in both sets. Explicit
//! overrides in the request always win.

use lazy_static::lazy_static;
use std::collections::HashMap;

use adw_state::ModelSet;

pub const MODEL_BASE: &str = "sonnet";
pub const MODEL_HEAVY: &str = "opus";

lazy_static! {
    static ref MODEL_TABLE: HashMap<(&'static str, ModelSet), &'static str> = {
        let mut table = HashMap::new();
        for command in [
            "/feature",
            "/bug",
            "/chore",
            "/implement",
            "/review",
            "/patch",
            "/resolve_failed_test",
            "/resolve_merge_conflict",
        ] {
            table.insert((command, ModelSet::Base), MODEL_BASE);
            table.insert((command, ModelSet::Heavy), MODEL_HEAVY);
        }
        for command in [
            "/classify_issue",
            "/generate_branch_name",
            "/test",
            "/document",
        ] {
            table.insert((command, ModelSet::Base), MODEL_BASE);
            table.insert((command, ModelSet::Heavy), MODEL_BASE);
        }
        table
    };
}

/// Model for a (slash command, model set) pair. Unknown commands fall
/// back to the base model.
pub fn model_for(slash_command: &str, model_set: ModelSet) -> &'static str {
    MODEL_TABLE
        .get(&(slash_command, model_set))
        .copied()
        .unwrap_or(MODEL_BASE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heavy_upgrades_planning_commands() {
        assert_eq!(model_for("/feature", ModelSet::Base), MODEL_BASE);
        assert_eq!(model_for("/feature", ModelSet::Heavy), MODEL_HEAVY);
        assert_eq!(model_for("/implement", ModelSet::Heavy), MODEL_HEAVY);
    }

    #[test]
    fn test_mechanical_commands_stay_base() {
        assert_eq!(model_for("/classify_issue", ModelSet::Heavy), MODEL_BASE);
        assert_eq!(
            model_for("/generate_branch_name", ModelSet::Heavy),
            MODEL_BASE
        );
    }

    #[test]
    fn test_unknown_command_falls_back() {
        assert_eq!(model_for("/nonexistent", ModelSet::Heavy), MODEL_BASE);
    }
}
