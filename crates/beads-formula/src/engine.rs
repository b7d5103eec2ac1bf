//! `{{variable}}` scanning and substitution.
//!
//! A variable reference is the literal pattern `{{` + identifier
//! (`[a-zA-Z_][a-zA-Z0-9_]*`) + `}}`. Substitution replaces known
//! references and leaves unknown ones untouched, which keeps templates
//! forward-compatible and makes substitution idempotent when values
//! introduce no new references.

use std::collections::HashMap;

use crate::types::{FormulaError, TemplateSchema, Variable};

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Finds the next `{{name}}` reference at or after `from`.
///
/// Returns `(start, end, name)` where `start..end` spans the whole
/// `{{name}}` token.
fn next_reference(text: &str, from: usize) -> Option<(usize, usize, &str)> {
    let mut search = from;
    while let Some(open_rel) = text[search..].find("{{") {
        let open = search + open_rel;
        let body = &text[open + 2..];

        let mut chars = body.char_indices();
        match chars.next() {
            Some((_, c)) if is_ident_start(c) => {}
            _ => {
                // Advance one byte, not past both braces: `{{{a}}}`
                // carries a real reference starting at the second brace.
                search = open + 1;
                continue;
            }
        }

        let mut name_len = 1;
        for (i, c) in chars {
            if is_ident_cont(c) {
                name_len = i + c.len_utf8();
            } else {
                break;
            }
        }

        if body[name_len..].starts_with("}}") {
            let name = &body[..name_len];
            return Some((open, open + 2 + name_len + 2, name));
        }
        search = open + 1;
    }
    None
}

/// Returns the distinct variable names referenced in `text`, in order of
/// first appearance.
pub fn extract_variables(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut pos = 0;
    while let Some((_, end, name)) = next_reference(text, pos) {
        if !seen.iter().any(|n| n == name) {
            seen.push(name.to_string());
        }
        pos = end;
    }
    seen
}

/// Replaces each known `{{name}}` with `vars[name]`. Unknown references
/// are preserved verbatim.
pub fn substitute_vars(text: &str, vars: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some((start, end, name)) = next_reference(text, pos) {
        result.push_str(&text[pos..start]);
        match vars.get(name) {
            Some(value) => result.push_str(value),
            None => result.push_str(&text[start..end]),
        }
        pos = end;
    }
    result.push_str(&text[pos..]);
    result
}

/// Classifies a set of referenced names against a template schema.
///
/// Declared names keep their declaration; undeclared ones come back as
/// [`Variable::Free`]. Declared-but-unreferenced variables are included
/// too, so defaults apply even when a field no longer mentions them.
pub fn classify_variables(referenced: &[String], schema: &TemplateSchema) -> Vec<Variable> {
    let mut out: Vec<Variable> = Vec::new();
    for name in referenced {
        match schema.vars.get(name) {
            Some(def) => out.push(Variable::Declared {
                name: name.clone(),
                required: def.required,
                default: def.default.clone(),
            }),
            None => out.push(Variable::Free(name.clone())),
        }
    }
    for (name, def) in &schema.vars {
        if !referenced.iter().any(|r| r == name) {
            out.push(Variable::Declared {
                name: name.clone(),
                required: def.required,
                default: def.default.clone(),
            });
        }
    }
    out
}

/// Builds the effective variable map for instantiation.
///
/// Defaults fill in missing optional values; provided values override
/// defaults. Fails with [`FormulaError::MissingVariables`] when any
/// required variable has no value.
pub fn resolve_vars(
    variables: &[Variable],
    provided: &HashMap<String, String>,
) -> Result<HashMap<String, String>, FormulaError> {
    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();

    for var in variables {
        let name = var.name();
        if let Some(value) = provided.get(name) {
            resolved.insert(name.to_string(), value.clone());
            continue;
        }
        if let Variable::Declared {
            default: Some(default),
            required: false,
            ..
        } = var
        {
            resolved.insert(name.to_string(), default.clone());
            continue;
        }
        missing.push(name.to_string());
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        missing.sort();
        missing.dedup();
        Err(FormulaError::MissingVariables(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarDef;

    fn make_vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // -- substitute_vars ---------------------------------------------------

    #[test]
    fn substitute_simple() {
        let vars = make_vars(&[("name", "auth")]);
        assert_eq!(substitute_vars("Design {{name}}", &vars), "Design auth");
    }

    #[test]
    fn substitute_multiple() {
        let vars = make_vars(&[("a", "X"), ("b", "Y")]);
        assert_eq!(substitute_vars("{{a}}-{{b}}", &vars), "X-Y");
    }

    #[test]
    fn substitute_missing_left_alone() {
        let vars = make_vars(&[("a", "X")]);
        assert_eq!(substitute_vars("{{a}} {{missing}}", &vars), "X {{missing}}");
    }

    #[test]
    fn substitute_no_vars() {
        let vars = HashMap::new();
        assert_eq!(substitute_vars("plain text", &vars), "plain text");
    }

    #[test]
    fn substitute_rejects_bad_identifiers() {
        let vars = make_vars(&[("1x", "no"), ("ok", "yes")]);
        // Digit-initial names are not references.
        assert_eq!(substitute_vars("{{1x}} {{ok}}", &vars), "{{1x}} yes");
        // Unterminated braces pass through.
        assert_eq!(substitute_vars("{{ok", &vars), "{{ok");
        assert_eq!(substitute_vars("{{ ok }}", &vars), "{{ ok }}");
    }

    #[test]
    fn substitute_is_idempotent() {
        let vars = make_vars(&[("v", "1.2.3")]);
        let once = substitute_vars("Release {{v}} ({{other}})", &vars);
        let twice = substitute_vars(&once, &vars);
        assert_eq!(once, twice);
    }

    // -- extract_variables -------------------------------------------------

    #[test]
    fn extract_ordered_distinct() {
        let vars = extract_variables("{{b}} then {{a}} then {{b}} again");
        assert_eq!(vars, vec!["b", "a"]);
    }

    #[test]
    fn extract_ignores_malformed() {
        let vars = extract_variables("{{}} {{ x }} {{9lives}} {{real_1}}");
        assert_eq!(vars, vec!["real_1"]);
    }

    // -- classify + resolve ------------------------------------------------

    fn schema_with(entries: &[(&str, bool, Option<&str>)]) -> TemplateSchema {
        let mut schema = TemplateSchema::default();
        for (name, required, default) in entries {
            schema.vars.insert(
                name.to_string(),
                VarDef {
                    description: String::new(),
                    required: *required,
                    default: default.map(String::from),
                },
            );
        }
        schema
    }

    #[test]
    fn resolve_uses_defaults() {
        let schema = schema_with(&[("env", false, Some("staging"))]);
        let vars = classify_variables(&["env".to_string()], &schema);
        let resolved = resolve_vars(&vars, &HashMap::new()).unwrap();
        assert_eq!(resolved["env"], "staging");

        let resolved = resolve_vars(&vars, &make_vars(&[("env", "prod")])).unwrap();
        assert_eq!(resolved["env"], "prod");
    }

    #[test]
    fn resolve_reports_missing_sorted() {
        let schema = schema_with(&[("name", true, None)]);
        let referenced = vec!["zeta".to_string(), "name".to_string(), "alpha".to_string()];
        let vars = classify_variables(&referenced, &schema);
        let err = resolve_vars(&vars, &HashMap::new()).unwrap_err();
        match err {
            FormulaError::MissingVariables(missing) => {
                assert_eq!(missing, vec!["alpha", "name", "zeta"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn declared_unreferenced_default_still_applies() {
        let schema = schema_with(&[("env", false, Some("staging"))]);
        let vars = classify_variables(&[], &schema);
        let resolved = resolve_vars(&vars, &HashMap::new()).unwrap();
        assert_eq!(resolved["env"], "staging");
    }
}
