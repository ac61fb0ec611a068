//! `Template`: a parameterized task program with a named-variable set and
//! declared types (§3, §6 "Variables"). Binds to a `Task` by substituting
//! variable values into the program source textually, before the result
//! is ever handed to `parse_program` — the template layer never touches
//! the AST, so it stays entirely decoupled from `compiler.rs`.

use std::collections::HashMap;

use vortex_shared::VortexError;

use crate::program::{MethodArg, VarType};

/// One `{{name}}` placeholder's declared type, checked against the
/// `MethodArg` supplied at bind time.
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: String,
    pub declared_type: VarType,
}

/// A task program containing `{{name}}` placeholders in place of literal
/// values, plus the declared type of each placeholder.
pub struct Template {
    name: String,
    source: String,
    vars: Vec<TemplateVar>,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<String>, vars: Vec<TemplateVar>) -> Self {
        Self { name: name.into(), source: source.into(), vars }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &[TemplateVar] {
        &self.vars
    }

    /// Substitute every declared variable's bound value into the source,
    /// producing a program ready for `parse_program`/`Task::create`.
    /// Every declared variable must be bound; unknown bound names are
    /// rejected (§7 `ValidationError`: surfaced at create/update, never at
    /// runtime).
    pub fn bind(&self, values: &HashMap<String, MethodArg>) -> Result<String, VortexError> {
        for unknown in values.keys() {
            if !self.vars.iter().any(|v| &v.name == unknown) {
                return Err(VortexError::ValidationError(format!(
                    "template {:?} has no variable named {unknown:?}",
                    self.name
                )));
            }
        }

        let mut rendered = self.source.clone();
        for var in &self.vars {
            let value = values.get(&var.name).ok_or_else(|| {
                VortexError::ValidationError(format!("missing value for template variable {:?}", var.name))
            })?;
            check_type(&var.declared_type, value).map_err(|e| {
                VortexError::ValidationError(format!("template variable {:?}: {e}", var.name))
            })?;
            let placeholder = format!("{{{{{}}}}}", var.name);
            rendered = rendered.replace(&placeholder, &render(value));
        }
        Ok(rendered)
    }
}

fn check_type(declared: &VarType, value: &MethodArg) -> Result<(), String> {
    let matches = matches!(
        (declared, value),
        (VarType::Int, MethodArg::Num(_))
            | (VarType::Float, MethodArg::Num(_))
            | (VarType::Duration, MethodArg::Duration(_))
            | (VarType::String, MethodArg::Str(_))
            | (VarType::Bool, MethodArg::Bool(_))
            | (VarType::Regex, MethodArg::Str(_))
            | (VarType::Lambda, MethodArg::Lambda(_))
            | (VarType::List, MethodArg::List(_))
            | (VarType::Star, _)
    );
    if matches {
        Ok(())
    } else {
        Err(format!("expected a value matching {declared:?}, found {value:?}"))
    }
}

fn render(value: &MethodArg) -> String {
    match value {
        MethodArg::Str(s) => format!("'{}'", s.replace('\'', "\\'")),
        MethodArg::Num(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        MethodArg::Bool(b) => b.to_string(),
        MethodArg::Duration(ns) => format!("{ns}ns"),
        MethodArg::Lambda(expr) => format!("lambda: {}", expr.pretty()),
        MethodArg::Ident(name) => name.clone(),
        MethodArg::List(items) => {
            let rendered: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::parse_program;

    #[test]
    fn binds_a_threshold_variable_into_a_complete_program() {
        let template = Template::new(
            "cpu-threshold",
            "stream|from().measurement('cpu')|alert().crit(lambda: usage_idle < {{threshold}})",
            vec![TemplateVar { name: "threshold".to_string(), declared_type: VarType::Int }],
        );
        let mut values = HashMap::new();
        values.insert("threshold".to_string(), MethodArg::Num(10.0));
        let rendered = template.bind(&values).unwrap();
        assert!(rendered.contains("usage_idle < 10"));
        parse_program(&rendered).unwrap();
    }

    #[test]
    fn rejects_a_type_mismatched_binding() {
        let template = Template::new(
            "cpu-threshold",
            "stream|from()|alert().crit(lambda: usage_idle < {{threshold}})",
            vec![TemplateVar { name: "threshold".to_string(), declared_type: VarType::Int }],
        );
        let mut values = HashMap::new();
        values.insert("threshold".to_string(), MethodArg::Str("oops".to_string()));
        assert!(template.bind(&values).is_err());
    }

    #[test]
    fn rejects_an_unknown_bound_variable_name() {
        let template = Template::new("t", "stream|from()|logOut()", Vec::new());
        let mut values = HashMap::new();
        values.insert("nope".to_string(), MethodArg::Bool(true));
        assert!(template.bind(&values).is_err());
    }

    #[test]
    fn rejects_a_missing_binding() {
        let template = Template::new(
            "t",
            "stream|from().measurement('{{name}}')|logOut()",
            vec![TemplateVar { name: "name".to_string(), declared_type: VarType::String }],
        );
        assert!(template.bind(&HashMap::new()).is_err());
    }
}
