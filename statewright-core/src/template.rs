//! Line-oriented machine templates.
//!
//! ```text
//! // comments start with //
//! S1 = closed
//! S2 = open
//! open: S1 -> S2
//! close: S2 → S1
//! ```
//!
//! `alias = state` lines name states. `event: from -> to` lines declare
//! transitions and may use aliases on either side. The full-width colon `：`
//! and the arrows `→` and `—》` are accepted too. Any other line is ignored.

use crate::definition::Transition;
use crate::error::FsmError;
use std::collections::HashMap;

const COLONS: [char; 2] = [':', '：'];
const ARROWS: [&str; 3] = ["->", "→", "—》"];

/// Parses a template into transitions, in declaration order.
pub fn parse(tpl: &str) -> Result<Vec<Transition<String, String>>, FsmError> {
    let lines: Vec<&str> = tpl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .collect();

    let aliases: HashMap<&str, &str> = lines.iter().filter_map(|line| parse_alias(line)).collect();
    let resolve = |name: &str| aliases.get(name).copied().unwrap_or(name).to_string();

    let transitions: Vec<_> = lines
        .iter()
        .filter_map(|line| parse_transition(line))
        .map(|(event, from, to)| Transition::new(event.to_string(), [resolve(from)], resolve(to)))
        .collect();

    if transitions.is_empty() {
        return Err(FsmError::InvalidDefinition {
            reason: "template declares no transitions".to_string(),
        });
    }
    Ok(transitions)
}

fn parse_alias(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once('=')?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() || value.contains('=') {
        return None;
    }
    Some((name, value))
}

fn parse_transition(line: &str) -> Option<(&str, &str, &str)> {
    let (event, rest) = line.split_once(COLONS)?;
    let (from, to) = ARROWS
        .iter()
        .find_map(|arrow| rest.split_once(arrow))?;
    let (event, from, to) = (event.trim(), from.trim(), to.trim());
    if event.is_empty() || from.is_empty() || to.is_empty() {
        return None;
    }
    Some((event, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(transitions: &[Transition<String, String>]) -> Vec<(&str, &str, &str)> {
        transitions
            .iter()
            .map(|t| {
                (
                    t.event.as_str(),
                    t.sources[0].as_str(),
                    t.destination.as_str(),
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_with_aliases() {
        let tpl = r#"
            // door
            S1 = closed
            S2 = open

            open: S1 -> S2
            close: S2 → S1
        "#;
        let transitions = parse(tpl).unwrap();
        assert_eq!(
            triples(&transitions),
            vec![("open", "closed", "open"), ("close", "open", "closed")]
        );
    }

    #[test]
    fn test_parse_alternate_separators() {
        let tpl = "支付：待支付 —》已支付\nship : paid->shipped\n";
        let transitions = parse(tpl).unwrap();
        assert_eq!(
            triples(&transitions),
            vec![("支付", "待支付", "已支付"), ("ship", "paid", "shipped")]
        );
    }

    #[test]
    fn test_unaliased_names_used_verbatim() {
        let transitions = parse("A = start\nrun: A -> end").unwrap();
        assert_eq!(triples(&transitions), vec![("run", "start", "end")]);
    }

    #[test]
    fn test_comments_and_noise_ignored() {
        let tpl = "// run: a -> b\nnot a transition\nrun: a -> b";
        assert_eq!(parse(tpl).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(matches!(
            parse("// nothing here\nS1 = a\n"),
            Err(FsmError::InvalidDefinition { .. })
        ));
    }
}
