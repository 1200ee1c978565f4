use ferroscan_core::{ParamSpec, PatternCatalogue, RuleInfo, ValidationError};

use crate::cli::PatternsArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &PatternsArgs) -> Result<CommandResult, CliError> {
    let catalogue = PatternCatalogue::standard();
    let rules: Vec<RuleInfo> = match &args.name {
        Some(name) => {
            let rule = catalogue
                .get(name)
                .ok_or_else(|| ValidationError::UnknownPattern { name: name.clone() })?;
            vec![RuleInfo::of(rule.as_ref())]
        }
        None => catalogue.rules().iter().map(|rule| RuleInfo::of(rule.as_ref())).collect(),
    };

    let rows = rules
        .iter()
        .flat_map(|rule| {
            rule.params.iter().map(move |param| {
                vec![
                    format!("{} v{}", rule.name, rule.version),
                    param.name.to_owned(),
                    default_label(param),
                    param.description.to_owned(),
                ]
            })
        })
        .collect();

    let data = serde_json::json!({ "patterns": rules });
    Ok(CommandResult::new(data)
        .with_summary("patterns", rules.len())
        .with_table(vec!["rule", "parameter", "default", "description"], rows))
}

fn default_label(param: &ParamSpec) -> String {
    match param.default_value() {
        ferroscan_core::patterns::ParamValue::Number(value) => value.to_string(),
        ferroscan_core::patterns::ParamValue::Flag(value) => value.to_string(),
    }
}
