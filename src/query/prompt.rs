//! Interactive completion of search parameters.

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Input};
use std::io::{self, IsTerminal};

use super::{QueryParams, DEFAULT_ORDER, DEFAULT_ORDER_BY};

/// Prompts for any parameter the caller left unset.
///
/// Start and end of the interval are required; the rest fall back to defaults
/// or are left empty. Fails when a required value is missing and stdin is not
/// a terminal.
pub fn complete_params(mut params: QueryParams, ask_optional: bool) -> Result<QueryParams> {
    let missing_interval = params.start.trim().is_empty() || params.end.trim().is_empty();
    if !missing_interval && !ask_optional {
        return Ok(params);
    }

    if !io::stdin().is_terminal() {
        if missing_interval {
            bail!("--start and --end are required in a non-interactive session");
        }
        return Ok(params);
    }

    let theme = ColorfulTheme::default();

    if params.start.trim().is_empty() {
        params.start = prompt_required(&theme, "Start of interval (yyyy-mm-ddThh:mm:ss-zz:zz)")?;
    }
    if params.end.trim().is_empty() {
        params.end = prompt_required(&theme, "End of interval (yyyy-mm-ddThh:mm:ss-zz:zz)")?;
    }

    if ask_optional {
        if params.order.is_none() {
            params.order = prompt_optional(&theme, &format!("Order (desc / asc) [{DEFAULT_ORDER}]"))?;
        }
        if params.order_by.is_none() {
            params.order_by = prompt_optional(
                &theme,
                &format!(
                    "Order by (conversationStart, segmentStart, segmentEnd) [{DEFAULT_ORDER_BY}]"
                ),
            )?;
        }
        if params.division_id.is_none() {
            params.division_id = prompt_optional(&theme, "Division ID (empty for all)")?;
        }
        if params.originating_direction.is_none() {
            params.originating_direction =
                prompt_optional(&theme, "Originating direction (inbound, outbound, empty to ignore)")?;
        }
    }

    Ok(params)
}

fn prompt_required(theme: &ColorfulTheme, label: &str) -> Result<String> {
    loop {
        let value: String = Input::with_theme(theme)
            .with_prompt(label)
            .interact_text()?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            println!("Value cannot be empty.");
            continue;
        }
        return Ok(trimmed.to_string());
    }
}

fn prompt_optional(theme: &ColorfulTheme, label: &str) -> Result<Option<String>> {
    let value: String = Input::with_theme(theme)
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()?;
    let trimmed = value.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
