//! Execution graph: invocation trees flattened into arenas.
//!
//! Each stock execution becomes a `ChainBlueprint`: nodes in post-order
//! (sub-invocations before their parent), edges as `NodeId` indices into the
//! same vector, root last. A blueprint holds constructors and settings, not
//! instances, so one blueprint can stamp out an independent chain per symbol.

use std::collections::HashSet;

use crate::algorithms::{
    AlgorithmError, AlgorithmRegistry, AlgorithmSettings, EodAlgorithm, EodConstructor, StockAlgorithm,
    StockConstructor,
};
use crate::data::Day;
use crate::definition::{ConfigError, Execution, ExecutionDefinition, Invocation};

/// Index of a node within one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone)]
struct BlueprintNode {
    ctor: StockConstructor,
    settings: AlgorithmSettings,
    inputs: Vec<NodeId>,
}

/// Validated recipe for one stock execution.
#[derive(Clone)]
pub struct ChainBlueprint {
    execution: String,
    nodes: Vec<BlueprintNode>,
}

impl ChainBlueprint {
    /// Flatten `execution` against the registry. Every node is constructed
    /// once here so that argument errors surface before any data is read.
    pub fn build(execution: &Execution, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        let mut blueprint = Self {
            execution: execution.name.clone(),
            nodes: Vec::new(),
        };
        blueprint.add(&execution.invocation, registry)?;
        blueprint.instantiate()?;
        Ok(blueprint)
    }

    fn add(&mut self, invocation: &Invocation, registry: &AlgorithmRegistry) -> Result<NodeId, ConfigError> {
        let inputs = invocation
            .children
            .iter()
            .map(|child| self.add(child, registry))
            .collect::<Result<Vec<_>, _>>()?;
        let ctor = registry
            .lookup_stock(&invocation.algorithm)
            .ok_or_else(|| ConfigError::Unregistered {
                algorithm: invocation.algorithm.clone(),
                execution: self.execution.clone(),
            })?;
        self.nodes.push(BlueprintNode {
            ctor,
            settings: AlgorithmSettings::from_invocation(&self.execution, invocation),
            inputs,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    pub fn execution(&self) -> &str {
        &self.execution
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fresh, independent chain with its own algorithm state.
    pub fn instantiate(&self) -> Result<StockChain, ConfigError> {
        let nodes = self
            .nodes
            .iter()
            .map(|node| -> Result<ChainNode, ConfigError> {
                let algorithm = (node.ctor)(&node.settings).map_err(|e| load_error(&node.settings, e))?;
                Ok(ChainNode {
                    name: node.settings.algorithm.clone(),
                    algorithm,
                    inputs: node.inputs.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StockChain {
            execution: self.execution.clone(),
            nodes,
            outputs: Vec::with_capacity(self.nodes.len()),
        })
    }
}

fn load_error(settings: &AlgorithmSettings, error: AlgorithmError) -> ConfigError {
    ConfigError::AlgorithmLoad {
        algorithm: settings.algorithm.clone(),
        execution: settings.execution.clone(),
        reason: error.to_string(),
    }
}

struct ChainNode {
    name: String,
    algorithm: Box<dyn StockAlgorithm>,
    inputs: Vec<NodeId>,
}

/// Live per-symbol chain.
pub struct StockChain {
    execution: String,
    nodes: Vec<ChainNode>,
    outputs: Vec<Option<f64>>,
}

/// A node failed while processing a day.
#[derive(Debug)]
pub struct NodeFailure {
    pub algorithm: String,
    pub source: AlgorithmError,
}

impl StockChain {
    pub fn execution(&self) -> &str {
        &self.execution
    }

    /// Run every node on `day` in arena order. Returns the root output.
    pub fn process(&mut self, day: &Day) -> Result<Option<f64>, NodeFailure> {
        self.outputs.clear();
        let mut inputs = Vec::new();
        for node in &mut self.nodes {
            inputs.clear();
            inputs.extend(node.inputs.iter().map(|id| self.outputs[id.0]));
            let out = node.algorithm.process(day, &inputs).map_err(|source| NodeFailure {
                algorithm: node.name.clone(),
                source,
            })?;
            self.outputs.push(out);
        }
        Ok(self.outputs.last().copied().flatten())
    }
}

// ─── EOD slots ───────────────────────────────────────────────────────

/// One instantiated end-of-day execution.
pub struct EodSlot {
    pub execution: String,
    pub algorithm_name: String,
    pub algorithm: Box<dyn EodAlgorithm>,
}

impl EodSlot {
    pub fn build(execution: &Execution, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        let invocation = &execution.invocation;
        let ctor: EodConstructor = registry
            .lookup_eod(&invocation.algorithm)
            .ok_or_else(|| ConfigError::Unregistered {
                algorithm: invocation.algorithm.clone(),
                execution: execution.name.clone(),
            })?;
        let settings = AlgorithmSettings::from_invocation(&execution.name, invocation);
        let algorithm = ctor(&settings).map_err(|e| load_error(&settings, e))?;
        Ok(Self {
            execution: execution.name.clone(),
            algorithm_name: invocation.algorithm.clone(),
            algorithm,
        })
    }
}

// ─── Whole graph ─────────────────────────────────────────────────────

/// Everything `Initialized` needs to start a run.
pub struct ExecutionGraph {
    pub stock: Vec<ChainBlueprint>,
    pub eod: Vec<EodSlot>,
}

impl ExecutionGraph {
    /// Resolve every name, construct every algorithm once, and check that
    /// each end-of-day dependency is a declared stock execution.
    pub fn build(definition: &ExecutionDefinition, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        definition.validate_names()?;
        let stock = definition
            .stock_executions
            .iter()
            .map(|e| ChainBlueprint::build(e, registry))
            .collect::<Result<Vec<_>, _>>()?;
        let eod = definition
            .eod_executions
            .iter()
            .map(|e| EodSlot::build(e, registry))
            .collect::<Result<Vec<_>, _>>()?;

        let declared: HashSet<&str> = stock.iter().map(|b| b.execution()).collect();
        for slot in &eod {
            for dependency in slot.algorithm.dependencies() {
                if !declared.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        execution: slot.execution.clone(),
                        dependency,
                    });
                }
            }
        }
        Ok(Self { stock, eod })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::make_series;
    use crate::definition::parse_definition;

    fn registry() -> AlgorithmRegistry {
        AlgorithmRegistry::with_builtins()
    }

    #[test]
    fn children_precede_parents() {
        let def = parse_definition(
            "StockExecutions = spread\n\
             spread.loadLine = Diff(Sma(n = 2i, Input(e = close)), Input(e = close))",
        )
        .unwrap();
        let bp = ChainBlueprint::build(&def.stock_executions[0], &registry()).unwrap();
        let names: Vec<&str> = bp.nodes.iter().map(|n| n.settings.algorithm.as_str()).collect();
        assert_eq!(names, vec!["Input", "Sma", "Input", "Diff"]);
        assert_eq!(bp.nodes[3].inputs, vec![NodeId(1), NodeId(2)]);
        assert_eq!(bp.nodes[1].inputs, vec![NodeId(0)]);
    }

    #[test]
    fn chain_computes_root_output() {
        let def = parse_definition(
            "StockExecutions = spread\n\
             spread.loadLine = Diff(Input(e = close), Sma(n = 2i, Input(e = close)))",
        )
        .unwrap();
        let bp = ChainBlueprint::build(&def.stock_executions[0], &registry()).unwrap();
        let mut chain = bp.instantiate().unwrap();
        let series = make_series("SPY", &[10.0, 14.0]);
        assert_eq!(chain.process(&series.days()[0]).unwrap(), None);
        assert_eq!(chain.process(&series.days()[1]).unwrap(), Some(2.0));
    }

    #[test]
    fn instances_do_not_share_state() {
        let def = parse_definition("StockExecutions = s\ns.loadLine = Sma(n = 2i, Input(e = close))").unwrap();
        let bp = ChainBlueprint::build(&def.stock_executions[0], &registry()).unwrap();
        let series = make_series("SPY", &[1.0, 3.0]);
        let mut a = bp.instantiate().unwrap();
        let mut b = bp.instantiate().unwrap();
        a.process(&series.days()[0]).unwrap();
        assert_eq!(a.process(&series.days()[1]).unwrap(), Some(2.0));
        assert_eq!(b.process(&series.days()[1]).unwrap(), None);
    }

    #[test]
    fn constructor_failure_is_reported_with_execution() {
        let def = parse_definition("StockExecutions = a1\na1.loadLine = Sma(n = 3i)").unwrap();
        let err = ChainBlueprint::build(&def.stock_executions[0], &registry()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Exception while loading algo: Sma( a1 ) , exception: Sma algorithm should receive at least one sub algorithm"
        );
    }

    #[test]
    fn unknown_algorithm_is_unregistered() {
        let def = parse_definition("StockExecutions = a\na.loadLine = Sma(n = 3i, Price())").unwrap();
        let err = ChainBlueprint::build(&def.stock_executions[0], &registry()).err().unwrap();
        assert_eq!(err.to_string(), "algorithm Price is not registered (execution a)");
    }

    #[test]
    fn eod_dependency_must_be_declared() {
        let def = parse_definition(
            "StockExecutions = fast\nEodExecutions = t\n\
             fast.loadLine = Input(e = close)\n\
             t.loadLine = CrossTrader(fast = fast, slow = slow)",
        )
        .unwrap();
        let err = ExecutionGraph::build(&def, &registry()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownDependency { ref dependency, .. } if dependency == "slow"));
    }

    #[test]
    fn stock_name_in_eod_slot_is_unregistered() {
        let def = parse_definition("EodExecutions = t\nt.loadLine = Sma(n = 3i)").unwrap();
        assert!(matches!(
            ExecutionGraph::build(&def, &registry()).err(),
            Some(ConfigError::Unregistered { .. })
        ));
    }
}
