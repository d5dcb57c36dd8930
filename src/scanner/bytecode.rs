/// Constant-pool scan for bytecode units.
///
/// Each class is scanned in pool order. Class references are matched against the
/// blocked classes and package prefixes; method references against the blocked
/// method table unless their owner is already blocked as a class. Each distinct
/// offending reference is reported once per declaring class.
use crate::config::catalog::BytecodeRules;
use crate::config::types::{BudgetExceeded, ErrorCode, Violation};
use crate::lang::jvm::{referenced_class, ClassFile, Constant};
use crate::lang::BytecodeUnit;
use crate::pipeline::budget::Budget;
use std::collections::BTreeSet;

pub fn scan(
    unit: &BytecodeUnit,
    rules: &BytecodeRules,
    budget: &Budget,
) -> Result<Vec<Violation>, BudgetExceeded> {
    let methods = MethodRule::parse_all(&rules.blocked_methods);
    let mut found = Vec::new();
    for class in unit.classes() {
        scan_class(class, rules, &methods, budget, &mut found)?;
    }
    Ok(found)
}

/// Blocked method entry, `owner.name` or `owner.name:descriptor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRule<'r> {
    pub owner: &'r str,
    pub name: &'r str,
    pub descriptor: Option<&'r str>,
}

impl<'r> MethodRule<'r> {
    pub fn parse(rule: &'r str) -> Option<Self> {
        let (target, descriptor) = match rule.split_once(':') {
            Some((target, descriptor)) => (target, Some(descriptor)),
            None => (rule, None),
        };
        let (owner, name) = target.rsplit_once('.')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner,
            name,
            descriptor,
        })
    }

    fn parse_all(rules: &'r BTreeSet<String>) -> Vec<Self> {
        rules.iter().filter_map(|rule| Self::parse(rule)).collect()
    }

    fn matches(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.owner == owner
            && self.name == name
            && self.descriptor.map_or(true, |d| d == descriptor)
    }
}

/// Blocked class or package prefix that `class` falls under
pub fn blocked_by<'r>(class: &str, rules: &'r BytecodeRules) -> Option<&'r str> {
    if let Some(exact) = rules.blocked_classes.get(class) {
        return Some(exact.as_str());
    }
    rules
        .blocked_packages
        .iter()
        .find(|package| {
            class
                .strip_prefix(package.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
        })
        .map(String::as_str)
}

fn scan_class(
    class: &ClassFile,
    rules: &BytecodeRules,
    methods: &[MethodRule<'_>],
    budget: &Budget,
    found: &mut Vec<Violation>,
) -> Result<(), BudgetExceeded> {
    let declaring = class.this_class();
    let mut reported: BTreeSet<String> = BTreeSet::new();

    for (index, constant) in class.pool.iter() {
        match constant {
            Constant::Class { name } => {
                let target = class.pool.utf8(*name).and_then(referenced_class);
                if let Some(target) = target {
                    if let Some(rule) = blocked_by(target, rules) {
                        if reported.insert(target.to_string()) {
                            found.push(
                                Violation::critical(
                                    ErrorCode::DisallowedPackageReference,
                                    format!(
                                        "Reference to disallowed class {} (blocked: {})",
                                        target, rule
                                    ),
                                )
                                .at_symbol(declaring),
                            );
                        }
                    }
                }
            }
            Constant::MethodRef { .. } | Constant::InterfaceMethodRef { .. } => {
                if let Some(member) = class.pool.member(index) {
                    let owner = referenced_class(member.owner).unwrap_or(member.owner);
                    let owner_blocked = blocked_by(owner, rules).is_some();
                    let hit = !owner_blocked
                        && methods
                            .iter()
                            .any(|rule| rule.matches(owner, member.name, member.descriptor));
                    let key = format!("{}.{}:{}", owner, member.name, member.descriptor);
                    if hit && reported.insert(key) {
                        found.push(
                            Violation::critical(
                                ErrorCode::DisallowedPackageReference,
                                format!(
                                    "Call to disallowed method {}.{}{}",
                                    owner, member.name, member.descriptor
                                ),
                            )
                            .at_symbol(declaring),
                        );
                    }
                }
            }
            _ => {}
        }
        budget.check()?;
    }
    Ok(())
}
