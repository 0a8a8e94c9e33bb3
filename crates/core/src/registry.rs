//! Per-template strategy registries.
//!
//! Renderers and file-data mergers are chosen by template name. A registry is built once at
//! startup from every registered strategy and must contain exactly one default, which answers for
//! any name no other strategy claims. Registration order never affects resolution.

use crate::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;

/// A strategy that declares which templates it serves.
pub trait Strategy: Send + Sync {
    /// Template names this strategy is registered under.
    fn handles(&self) -> &[&'static str];

    /// Whether this strategy answers for unregistered template names.
    fn is_default(&self) -> bool {
        false
    }
}

pub struct StrategyRegistry<T: ?Sized + Strategy> {
    by_name: HashMap<&'static str, Arc<T>>,
    default: Arc<T>,
}

impl<T: ?Sized + Strategy> StrategyRegistry<T> {
    /// Builds a registry from all strategies.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no strategy or more than one strategy is marked default, or if
    /// two strategies claim the same template name.
    pub fn build(strategies: Vec<Arc<T>>) -> CoreResult<Self> {
        let mut by_name: HashMap<&'static str, Arc<T>> = HashMap::new();
        let mut default: Option<Arc<T>> = None;

        for strategy in strategies {
            if strategy.is_default() {
                if default.is_some() {
                    return Err(CoreError::Configuration(
                        "more than one default strategy registered".into(),
                    ));
                }
                default = Some(Arc::clone(&strategy));
            }
            for &name in strategy.handles() {
                if by_name.insert(name, Arc::clone(&strategy)).is_some() {
                    return Err(CoreError::Configuration(format!(
                        "template '{}' is registered twice",
                        name
                    )));
                }
            }
        }

        let default = default.ok_or_else(|| {
            CoreError::Configuration("no default strategy registered".into())
        })?;
        Ok(Self { by_name, default })
    }

    /// The strategy registered for `template_name`, else the default.
    pub fn resolve(&self, template_name: &str) -> Arc<T> {
        self.by_name
            .get(template_name)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    pub fn is_registered(&self, template_name: &str) -> bool {
        self.by_name.contains_key(template_name)
    }

    /// Registered template names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        names: &'static [&'static str],
        default: bool,
    }

    impl Strategy for Named {
        fn handles(&self) -> &[&'static str] {
            self.names
        }

        fn is_default(&self) -> bool {
            self.default
        }
    }

    fn named(names: &'static [&'static str], default: bool) -> Arc<dyn Strategy> {
        Arc::new(Named { names, default })
    }

    #[test]
    fn test_resolve_exact_match_else_default() {
        let default = named(&["Default"], true);
        let area = named(&["Area"], false);
        let registry =
            StrategyRegistry::build(vec![Arc::clone(&area), Arc::clone(&default)]).unwrap();

        assert!(Arc::ptr_eq(&registry.resolve("Area"), &area));
        assert!(Arc::ptr_eq(&registry.resolve("Default"), &default));
        assert!(Arc::ptr_eq(&registry.resolve("Unknown"), &default));
        assert!(Arc::ptr_eq(&registry.resolve(""), &default));
        assert_eq!(registry.names(), vec!["Area", "Default"]);
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let default = named(&["Default"], true);
        let area = named(&["Area"], false);
        let forward =
            StrategyRegistry::build(vec![Arc::clone(&default), Arc::clone(&area)]).unwrap();
        let backward =
            StrategyRegistry::build(vec![Arc::clone(&area), Arc::clone(&default)]).unwrap();
        for name in ["Area", "Default", "x"] {
            assert!(Arc::ptr_eq(&forward.resolve(name), &backward.resolve(name)));
        }
    }

    #[test]
    fn test_build_without_default_fails() {
        let result = StrategyRegistry::build(vec![named(&["Area"], false)]);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_build_with_two_defaults_fails() {
        let result = StrategyRegistry::build(vec![named(&["A"], true), named(&["B"], true)]);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_name_fails() {
        let result = StrategyRegistry::build(vec![named(&["A"], true), named(&["A"], false)]);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }
}
