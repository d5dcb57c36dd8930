/// Syntax-tree scan for python source units.
///
/// Statements are visited in source order and expressions in pre-order, so the
/// violation list follows the text. Every call yields at most one call violation,
/// the most specific one: builtin, then file, then network. Call targets are read
/// through the module's import aliases, so `np.load` is checked as `numpy.load`.
use crate::config::catalog::SourceRules;
use crate::config::types::{BudgetExceeded, ErrorCode, Violation};
use crate::lang::python::ast::{Expr, ExprKind, Module, Stmt, StmtKind};
use crate::pipeline::budget::Budget;
use std::collections::{BTreeMap, BTreeSet};

/// Module roots through which builtins are reachable by attribute
const BUILTIN_ROOTS: &[&str] = &["builtins", "__builtins__"];

pub fn scan(module: &Module, rules: &SourceRules, budget: &Budget) -> Result<Vec<Violation>, BudgetExceeded> {
    let mut scan = SourceScan {
        rules,
        budget,
        aliases: Aliases::collect(&module.body),
        found: Vec::new(),
    };
    scan.block(&module.body)?;
    Ok(scan.found)
}

/// Local names bound by imports anywhere in the module, mapped to what they import
#[derive(Debug, Default)]
struct Aliases(BTreeMap<String, String>);

impl Aliases {
    fn collect(body: &[Stmt]) -> Self {
        let mut aliases = Self::default();
        let mut pending: Vec<&[Stmt]> = vec![body];
        while let Some(stmts) = pending.pop() {
            for stmt in stmts {
                match &stmt.kind {
                    StmtKind::Import(names) => {
                        for name in names.iter().filter(|n| n.alias.is_some()) {
                            aliases.bind(name.bound(), name.path.clone());
                        }
                    }
                    StmtKind::ImportFrom {
                        module: Some(module),
                        level: 0,
                        names,
                    } => {
                        for name in names.iter().filter(|n| n.path != "*") {
                            aliases.bind(name.bound(), format!("{}.{}", module, name.path));
                        }
                    }
                    StmtKind::ClassDef(class) => pending.push(&class.body),
                    StmtKind::FunctionDef(function) => pending.push(&function.body),
                    StmtKind::Compound { body, .. } => pending.push(body),
                    _ => {}
                }
            }
        }
        aliases
    }

    fn bind(&mut self, local: &str, target: String) {
        if local != target {
            self.0.insert(local.to_string(), target);
        }
    }

    /// `np.linalg.norm` -> `numpy.linalg.norm`
    fn resolve(&self, dotted: &str) -> String {
        let (head, rest) = match dotted.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (dotted, None),
        };
        match (self.0.get(head), rest) {
            (Some(target), Some(rest)) => format!("{}.{}", target, rest),
            (Some(target), None) => target.clone(),
            (None, _) => dotted.to_string(),
        }
    }
}

/// Match a resolved call against a `module.function` pattern.
fn function_matches(pattern: &str, path: Option<&str>, name: &str) -> bool {
    let (module, function) = match pattern.rsplit_once('.') {
        Some(parts) => parts,
        None => return false,
    };
    let named = match function.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == function,
    };
    named
        && (module == "*"
            || path
                .and_then(|path| path.rsplit_once('.'))
                .map_or(false, |(owner, _)| owner == module))
}

struct SourceScan<'r> {
    rules: &'r SourceRules,
    budget: &'r Budget,
    aliases: Aliases,
    found: Vec<Violation>,
}

impl SourceScan<'_> {
    fn block(&mut self, body: &[Stmt]) -> Result<(), BudgetExceeded> {
        for stmt in body {
            self.statement(stmt)?;
            self.budget.check()?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), BudgetExceeded> {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for name in names {
                    self.import(name.root(), &name.path, stmt.line);
                }
            }
            StmtKind::ImportFrom {
                module,
                level,
                names,
            } => match module {
                _ if *level > 0 => {
                    let dots = ".".repeat(*level as usize);
                    let target = format!("{}{}", dots, module.as_deref().unwrap_or(""));
                    let imported: Vec<&str> = names.iter().map(|n| n.path.as_str()).collect();
                    self.found.push(
                        Violation::critical(
                            ErrorCode::ImportNotWhitelisted,
                            format!("Relative import not allowed: from {} import {}", target, imported.join(", ")),
                        )
                        .at_line(stmt.line),
                    );
                }
                Some(path) => {
                    let root = path.split('.').next().unwrap_or(path);
                    self.import(root, path, stmt.line);
                }
                None => {}
            },
            StmtKind::ClassDef(class) => {
                self.exprs(&class.decorators);
                self.exprs(&class.bases);
                self.block(&class.body)?;
            }
            StmtKind::FunctionDef(function) => {
                self.exprs(&function.decorators);
                self.exprs(&function.header);
                self.block(&function.body)?;
            }
            StmtKind::Compound { header, body, .. } => {
                self.exprs(header);
                self.block(body)?;
            }
            StmtKind::Simple(exprs) => self.exprs(exprs),
        }
        Ok(())
    }

    fn import(&mut self, root: &str, path: &str, line: u32) {
        let violation = if self.rules.blocked_imports.contains(root) {
            Violation::critical(ErrorCode::DisallowedImport, format!("Disallowed import: {}", path))
        } else if !self.rules.allowed_imports.contains(root) {
            Violation::critical(
                ErrorCode::ImportNotWhitelisted,
                format!("Import not in whitelist: {}", path),
            )
        } else {
            return;
        };
        self.found.push(violation.at_line(line));
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    /// Pre-order walk with an explicit stack; expression trees can be deep.
    fn expr(&mut self, root: &Expr) {
        let mut stack = vec![root];
        while let Some(expr) = stack.pop() {
            match &expr.kind {
                ExprKind::Call { func, .. } => {
                    if let Some(violation) = self.call(func) {
                        self.found.push(violation.at_line(expr.line));
                    }
                }
                ExprKind::Attribute { attr, .. } if self.rules.dangerous_attributes.contains(attr) => {
                    self.found.push(
                        Violation::critical(
                            ErrorCode::DangerousPattern,
                            format!("Access to restricted attribute: {}", attr),
                        )
                        .at_line(expr.line),
                    );
                }
                ExprKind::Name(name) if self.rules.dangerous_names.contains(name) => {
                    self.found.push(
                        Violation::critical(
                            ErrorCode::DangerousPattern,
                            format!("Reference to restricted name: {}", name),
                        )
                        .at_line(expr.line),
                    );
                }
                _ => {}
            }
            let children = expr.children();
            stack.extend(children.into_iter().rev());
        }
    }

    fn call(&self, func: &Expr) -> Option<Violation> {
        let rules = self.rules;
        let written = func.dotted();
        // None when the receiver is not a plain name chain, e.g. `f().to_csv`
        let path = written.as_deref().map(|dotted| self.aliases.resolve(dotted));
        let name = match (&func.kind, path.as_deref()) {
            (_, Some(path)) => path.rsplit('.').next().unwrap_or(path).to_string(),
            (ExprKind::Attribute { attr, .. }, None) => attr.clone(),
            _ => return None,
        };
        let root = path
            .as_deref()
            .and_then(|path| path.split_once('.'))
            .map(|(root, _)| root);
        let callee = written.unwrap_or_else(|| format!("<expr>.{}", name));

        let builtin = rules.blocked_builtins.contains(&name)
            && match root {
                None => path.is_some(),
                Some(root) => BUILTIN_ROOTS.contains(&root),
            };
        if builtin {
            return Some(Violation::critical(
                ErrorCode::DisallowedBuiltin,
                format!("Disallowed builtin call: {}()", callee),
            ));
        }

        let touches = |methods: &BTreeSet<String>,
                       modules: &BTreeSet<String>,
                       functions: &BTreeSet<String>| {
            methods.contains(&name)
                || root.map_or(false, |root| modules.contains(root))
                || functions
                    .iter()
                    .any(|pattern| function_matches(pattern, path.as_deref(), &name))
        };
        if touches(&rules.file_methods, &rules.file_modules, &rules.file_functions) {
            return Some(Violation::critical(
                ErrorCode::DisallowedFileOperation,
                format!("File operation not allowed: {}()", callee),
            ));
        }
        if touches(&rules.network_methods, &rules.network_modules, &rules.network_functions) {
            return Some(Violation::critical(
                ErrorCode::DisallowedNetworkOperation,
                format!("Network operation not allowed: {}()", callee),
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;
    use crate::config::types::Location;
    use crate::lang::python::parse;
    use crate::testing::fixtures::VALID_MODEL_SOURCE;
    use std::time::Duration;

    fn scan_source(source: &str) -> Vec<Violation> {
        let module = parse(source).unwrap();
        scan(&module, &presets::alphaback_v1().source, &Budget::unlimited()).unwrap()
    }

    fn codes(violations: &[Violation]) -> Vec<ErrorCode> {
        violations.iter().map(|v| v.code).collect()
    }

    #[test]
    fn test_clean_model_has_no_violations() {
        assert!(scan_source(VALID_MODEL_SOURCE).is_empty());
    }

    #[test]
    fn test_import_classification() {
        let found = scan_source("import os.path\nimport numpy, yaml\nfrom socket import socket\nfrom . import helpers\n");
        assert_eq!(
            codes(&found),
            vec![
                ErrorCode::DisallowedImport,
                ErrorCode::ImportNotWhitelisted,
                ErrorCode::DisallowedImport,
                ErrorCode::ImportNotWhitelisted,
            ]
        );
        assert_eq!(found[0].message, "Disallowed import: os.path");
        assert_eq!(found[1].location, Some(Location::Line(2)));
        assert_eq!(found[3].location, Some(Location::Line(4)));
    }

    #[test]
    fn test_calls_one_violation_each() {
        let found = scan_source(
            "x = eval('1')\nf = open('a')\nf.write('x')\nos.remove('a')\nsocket.socket()\nconn.sendall(b'')\n",
        );
        assert_eq!(
            codes(&found),
            vec![
                ErrorCode::DisallowedBuiltin,
                ErrorCode::DisallowedBuiltin,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedNetworkOperation,
                ErrorCode::DisallowedNetworkOperation,
            ]
        );
        let lines: Vec<_> = found.iter().map(|v| v.location.clone()).collect();
        assert_eq!(lines[5], Some(Location::Line(6)));
    }

    #[test]
    fn test_builtins_reached_through_module() {
        let found = scan_source("import builtins\nbuiltins.exec('x')\n");
        assert_eq!(
            codes(&found),
            vec![ErrorCode::DisallowedImport, ErrorCode::DisallowedBuiltin]
        );
    }

    #[test]
    fn test_dangerous_patterns() {
        let found = scan_source("g = f.__globals__\nb = __builtins__\n");
        assert_eq!(
            codes(&found),
            vec![ErrorCode::DangerousPattern, ErrorCode::DangerousPattern]
        );
        assert!(found[0].message.contains("__globals__"));
    }

    #[test]
    fn test_violations_inside_nested_blocks_and_fstrings() {
        let source = "class TradingModel:\n    def predict(self, stock_prices, volume, timestamps):\n        if volume:\n            import subprocess\n        return f\"{eval('1')}\"\n";
        let found = scan_source(source);
        assert_eq!(
            codes(&found),
            vec![ErrorCode::DisallowedImport, ErrorCode::DisallowedBuiltin]
        );
        assert_eq!(found[0].location, Some(Location::Line(4)));
        assert_eq!(found[1].location, Some(Location::Line(5)));
    }

    #[test]
    fn test_nested_call_arguments_are_scanned() {
        let found = scan_source("print(open(compile('x', 'f', 'exec')))\n");
        assert_eq!(
            codes(&found),
            vec![ErrorCode::DisallowedBuiltin, ErrorCode::DisallowedBuiltin]
        );
        assert!(found[0].message.contains("open"));
        assert!(found[1].message.contains("compile"));
    }

    #[test]
    fn test_fullwidth_identifiers_match_their_ascii_rules() {
        let found = scan_source("import ｏｓ\nx = ｅｖａｌ('1')\nb = __ｂｕｉｌｔｉｎｓ__\n");
        assert_eq!(
            codes(&found),
            vec![
                ErrorCode::DisallowedImport,
                ErrorCode::DisallowedBuiltin,
                ErrorCode::DangerousPattern,
            ]
        );
        assert_eq!(found[0].message, "Disallowed import: os");
        assert_eq!(found[1].location, Some(Location::Line(2)));
    }

    #[test]
    fn test_io_through_whitelisted_modules() {
        let source = "\
import numpy as np
import pandas as pd
from numpy import fromfile as raw
a = np.loadtxt('/etc/passwd')
b = pd.read_csv('http://attacker.example/x.csv')
np.save('/tmp/out.npy', a)
c = raw('/dev/mem')
pd.DataFrame(a).to_csv('/tmp/out.csv')
d = np.DataSource()
e = np.mean(a)
";
        let found = scan_source(source);
        assert_eq!(
            codes(&found),
            vec![
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedNetworkOperation,
            ]
        );
        let lines: Vec<_> = found.iter().map(|v| v.location.clone()).collect();
        assert_eq!(lines[0], Some(Location::Line(4)));
        assert_eq!(lines[5], Some(Location::Line(9)));
        assert_eq!(found[0].message, "File operation not allowed: np.loadtxt()");
        assert_eq!(found[4].message, "File operation not allowed: <expr>.to_csv()");
    }

    #[test]
    fn test_aliases_reach_blocked_modules_and_builtins() {
        let found = scan_source("from os import remove\nimport builtins as b\nremove('x')\nb.exec('y')\n");
        assert_eq!(
            codes(&found),
            vec![
                ErrorCode::DisallowedImport,
                ErrorCode::DisallowedImport,
                ErrorCode::DisallowedFileOperation,
                ErrorCode::DisallowedBuiltin,
            ]
        );
    }

    #[test]
    fn test_function_patterns() {
        assert!(function_matches("numpy.load*", Some("numpy.loadtxt"), "loadtxt"));
        assert!(!function_matches("numpy.load*", Some("numpy.linalg.load"), "load"));
        assert!(!function_matches("numpy.fromfile", Some("numpy.fromfile2"), "fromfile2"));
        assert!(function_matches("*.to_csv", None, "to_csv"));
        assert!(!function_matches("pandas.read_*", None, "read_csv"));
    }

    #[test]
    fn test_spent_budget_stops_scan() {
        let module = parse("import os\nimport sys\n").unwrap();
        let result = scan(
            &module,
            &presets::alphaback_v1().source,
            &Budget::start(Duration::ZERO),
        );
        assert!(result.is_err());
    }
}
