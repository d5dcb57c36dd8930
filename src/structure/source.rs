/// Source packages: parse the model entry, find the model class and check the
/// prediction method's parameters.
use super::locate;
use crate::config::catalog::SourceRules;
use crate::config::types::{ErrorCode, Violation};
use crate::lang::python::{self, ast};
use crate::lang::SourceUnit;
use crate::loader::Entries;

pub fn validate(entries: &Entries, rules: &SourceRules) -> Result<SourceUnit, Violation> {
    let (entry, bytes) = locate(entries, &rules.entry_name)?;

    let module = python::parse_bytes(bytes).map_err(|e| {
        Violation::critical(
            ErrorCode::SyntaxError,
            format!("Syntax error in {}: {}", entry, e),
        )
        .at_line(e.line)
    })?;

    // later definitions shadow earlier ones, as at import time
    let (class_line, class) = module
        .body
        .iter()
        .rev()
        .find_map(|stmt| match &stmt.kind {
            ast::StmtKind::ClassDef(class) if class.name == rules.required_class => {
                Some((stmt.line, class))
            }
            _ => None,
        })
        .ok_or_else(|| {
            Violation::critical(
                ErrorCode::MissingRequiredClass,
                format!("Required class '{}' not found in {}", rules.required_class, entry),
            )
        })?;

    let (method_line, method) = class
        .body
        .iter()
        .rev()
        .find_map(|stmt| match &stmt.kind {
            ast::StmtKind::FunctionDef(function) if function.name == rules.required_method => {
                Some((stmt.line, function))
            }
            _ => None,
        })
        .ok_or_else(|| {
            Violation::critical(
                ErrorCode::MissingRequiredMethod,
                format!(
                    "Class '{}' has no '{}' method",
                    rules.required_class, rules.required_method
                ),
            )
            .at_line(class_line)
        })?;

    check_signature(method, rules).map_err(|v| v.at_line(method_line))?;

    Ok(SourceUnit {
        entry: entry.to_string(),
        module,
    })
}

fn check_signature(method: &ast::FunctionDef, rules: &SourceRules) -> Result<(), Violation> {
    let mismatch = |detail: &str| {
        Violation::critical(
            ErrorCode::InvalidMethodSignature,
            format!(
                "{} must be declared as {}({}); found {}({}){}",
                rules.required_method,
                rules.required_method,
                rules.required_params.join(", "),
                method.name,
                render_params(&method.params),
                detail
            ),
        )
    };

    if method.is_async {
        return Err(mismatch(": method must not be async"));
    }

    let positional: Vec<&ast::Param> = method.params.iter().filter(|p| p.is_positional()).collect();
    let leading_match = positional.len() >= rules.required_params.len()
        && positional
            .iter()
            .zip(&rules.required_params)
            .all(|(param, required)| param.name == *required);
    if !leading_match {
        return Err(mismatch(""));
    }

    if let Some(extra) = positional[rules.required_params.len()..]
        .iter()
        .find(|p| !p.has_default)
    {
        return Err(mismatch(&format!(
            ": extra parameter '{}' needs a default",
            extra.name
        )));
    }

    if let Some(kw) = method
        .params
        .iter()
        .find(|p| p.kind == ast::ParamKind::KeywordOnly && !p.has_default)
    {
        return Err(mismatch(&format!(
            ": keyword-only parameter '{}' needs a default",
            kw.name
        )));
    }

    Ok(())
}

fn render_params(params: &[ast::Param]) -> String {
    params
        .iter()
        .map(|p| match p.kind {
            ast::ParamKind::VarArgs => format!("*{}", p.name),
            ast::ParamKind::VarKeywords => format!("**{}", p.name),
            _ if p.has_default => format!("{}=...", p.name),
            _ => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
