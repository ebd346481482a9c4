//! Algorithm registry: explicit name → constructor table.
//!
//! Names are matched exactly. `search` offers a fragment lookup for tooling
//! but is never consulted when a definition is instantiated.

use std::collections::BTreeMap;

use super::{eod, stock, AlgorithmError, AlgorithmSettings, EodAlgorithm, StockAlgorithm};

pub type StockConstructor = fn(&AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError>;
pub type EodConstructor = fn(&AlgorithmSettings) -> Result<Box<dyn EodAlgorithm>, AlgorithmError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("algorithm {name} already registered")]
    Duplicate { name: String },
}

/// Which capability a registered name provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlgorithmKind {
    Stock,
    Eod,
}

/// Constructors keyed by exact name. One namespace across both kinds.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    stock: BTreeMap<String, StockConstructor>,
    eod: BTreeMap<String, EodConstructor>,
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("stock", &self.stock.keys().collect::<Vec<_>>())
            .field("eod", &self.eod.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AlgorithmRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with every built-in algorithm.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let stock: [(&str, StockConstructor); 5] = [
            ("Input", stock::Input::build),
            ("Sma", stock::Sma::build),
            ("Ema", stock::Ema::build),
            ("Diff", stock::Diff::build),
            ("Level", stock::Level::build),
        ];
        let eod: [(&str, EodConstructor); 3] = [
            ("BuyAndHold", eod::BuyAndHold::build),
            ("ThresholdTrader", eod::ThresholdTrader::build),
            ("CrossTrader", eod::CrossTrader::build),
        ];
        for (name, ctor) in stock {
            registry.stock.insert(name.to_string(), ctor);
        }
        for (name, ctor) in eod {
            registry.eod.insert(name.to_string(), ctor);
        }
        registry
    }

    pub fn register_stock(&mut self, name: &str, ctor: StockConstructor) -> Result<(), RegistryError> {
        self.ensure_free(name)?;
        self.stock.insert(name.to_string(), ctor);
        Ok(())
    }

    pub fn register_eod(&mut self, name: &str, ctor: EodConstructor) -> Result<(), RegistryError> {
        self.ensure_free(name)?;
        self.eod.insert(name.to_string(), ctor);
        Ok(())
    }

    pub fn lookup_stock(&self, name: &str) -> Option<StockConstructor> {
        self.stock.get(name).copied()
    }

    pub fn lookup_eod(&self, name: &str) -> Option<EodConstructor> {
        self.eod.get(name).copied()
    }

    pub fn kind_of(&self, name: &str) -> Option<AlgorithmKind> {
        if self.stock.contains_key(name) {
            Some(AlgorithmKind::Stock)
        } else if self.eod.contains_key(name) {
            Some(AlgorithmKind::Eod)
        } else {
            None
        }
    }

    /// Names containing `fragment` (case-insensitive), sorted by kind then name.
    pub fn search(&self, fragment: &str) -> Vec<(String, AlgorithmKind)> {
        let needle = fragment.to_lowercase();
        let stock = self.stock.keys().map(|n| (n, AlgorithmKind::Stock));
        let eod = self.eod.keys().map(|n| (n, AlgorithmKind::Eod));
        stock
            .chain(eod)
            .filter(|(n, _)| n.to_lowercase().contains(&needle))
            .map(|(n, k)| (n.clone(), k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stock.len() + self.eod.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_free(&self, name: &str) -> Result<(), RegistryError> {
        if self.kind_of(name).is_some() {
            return Err(RegistryError::Duplicate {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{make_series, Day};
    use crate::definition::parse_definition;
    use crate::pipeline::graph::ChainBlueprint;

    #[test]
    fn builtins_are_registered_by_kind() {
        let r = AlgorithmRegistry::with_builtins();
        assert_eq!(r.kind_of("Sma"), Some(AlgorithmKind::Stock));
        assert_eq!(r.kind_of("CrossTrader"), Some(AlgorithmKind::Eod));
        assert_eq!(r.kind_of("Unknown"), None);
        assert!(r.lookup_stock("CrossTrader").is_none());
        assert!(r.lookup_eod("CrossTrader").is_some());
    }

    #[test]
    fn lookup_is_exact() {
        let r = AlgorithmRegistry::with_builtins();
        assert!(r.lookup_stock("sma").is_none());
        assert!(r.lookup_stock("Sm").is_none());
    }

    /// Emits a fixed tag so tests can tell constructors apart.
    struct Tagged(f64);

    impl StockAlgorithm for Tagged {
        fn process(&mut self, _day: &Day, _inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
            Ok(Some(self.0))
        }
    }

    fn plain(_: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        Ok(Box::new(Tagged(1.0)))
    }

    fn suffixed(_: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        Ok(Box::new(Tagged(2.0)))
    }

    fn prefixed(_: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        Ok(Box::new(Tagged(3.0)))
    }

    fn overlapping() -> AlgorithmRegistry {
        let mut r = AlgorithmRegistry::new();
        r.register_stock("Sma", plain).unwrap();
        r.register_stock("SmaFast", suffixed).unwrap();
        r.register_stock("XSma", prefixed).unwrap();
        r
    }

    const OVERLAPPING: [(&str, f64); 3] = [("Sma", 1.0), ("SmaFast", 2.0), ("XSma", 3.0)];

    #[test]
    fn overlapping_names_resolve_to_their_own_constructor() {
        let r = overlapping();
        let series = make_series("SPY", &[5.0]);
        let day = &series.days()[0];
        for (name, tag) in OVERLAPPING {
            let settings = AlgorithmSettings {
                execution: "e".into(),
                algorithm: name.into(),
                params: Vec::new(),
                sub_algorithms: 0,
            };
            let ctor = r.lookup_stock(name).unwrap();
            let mut algo = ctor(&settings).unwrap();
            assert_eq!(algo.process(day, &[]).unwrap(), Some(tag), "{name}");
        }
        assert_eq!(r.search("sma").len(), 3);
    }

    #[test]
    fn chains_use_the_exactly_named_constructor() {
        let r = overlapping();
        let series = make_series("SPY", &[5.0]);
        let day = &series.days()[0];
        for (name, tag) in OVERLAPPING {
            let def = parse_definition(&format!("StockExecutions = s\ns.loadLine = {name}()")).unwrap();
            let mut chain = ChainBlueprint::build(&def.stock_executions[0], &r)
                .unwrap()
                .instantiate()
                .unwrap();
            assert_eq!(chain.process(day).unwrap(), Some(tag), "{name}");
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut r = AlgorithmRegistry::with_builtins();
        let err = r.register_stock("Sma", stock::Sma::build).unwrap_err();
        assert_eq!(err.to_string(), "algorithm Sma already registered");
        // one namespace across kinds
        assert!(r.register_eod("Ema", eod::BuyAndHold::build).is_err());
    }

    #[test]
    fn search_by_fragment() {
        let r = AlgorithmRegistry::with_builtins();
        let hits: Vec<String> = r.search("ma").into_iter().map(|(n, _)| n).collect();
        assert_eq!(hits, vec!["Ema".to_string(), "Sma".to_string()]);
        let hits = r.search("TRADER");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(_, k)| *k == AlgorithmKind::Eod));
    }
}
