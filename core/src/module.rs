use std::{fmt, rc::Rc};

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{Instance, Value};
use crate::vm::{Native, Record, Vm};

/// Native modules and loaded record modules, looked up by name.
///
/// Natives are registered under qualified names such as `math.sqrt`. Records
/// are kept in load order; that order is the global slot layout used by
/// [`ModuleRegistry::bootup`].
#[derive(Default)]
pub struct ModuleRegistry {
    modules: FastHashMap<String, Box<dyn Module>>,
    natives: FastHashMap<&'static str, Native>,
    records: Vec<(String, Rc<Record>)>,
    record_index: FastHashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: fast_hash_map_new(),
            natives: fast_hash_map_new(),
            records: Vec::new(),
            record_index: fast_hash_map_new(),
        }
    }

    /// Register a native module and every native it exports.
    pub fn register_module(&mut self, name: &str, module: Box<dyn Module>) -> Result<()> {
        if self.modules.contains_key(name) {
            bail!("module '{}' is already registered", name);
        }
        if module.enabled() {
            module.register(self)?;
        }
        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Result<&dyn Module> {
        self.modules
            .get(name)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| anyhow!("Module '{}' not found", name))
    }

    pub fn get_module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn register_native(&mut self, native: Native) -> Result<()> {
        if self.natives.contains_key(native.name()) {
            bail!("native '{}' registered twice", native.name());
        }
        self.natives.insert(native.name(), native);
        Ok(())
    }

    pub fn get_native(&self, qualified: &str) -> Option<Native> {
        self.natives.get(qualified).copied()
    }

    pub fn native_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.natives.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Make `record` available as module `symbol`. Loading a symbol again
    /// replaces the earlier record but keeps its global slot.
    pub fn load_record(&mut self, symbol: &str, record: Rc<Record>) -> usize {
        if let Some(&slot) = self.record_index.get(symbol) {
            debug!(target: "pathvm::module", symbol, slot, "module record shadowed");
            self.records[slot].1 = record;
            return slot;
        }
        let slot = self.records.len();
        self.records.push((symbol.to_string(), record));
        self.record_index.insert(symbol.to_string(), slot);
        slot
    }

    pub fn get_record(&self, symbol: &str) -> Option<Rc<Record>> {
        self.record_index.get(symbol).map(|&slot| self.records[slot].1.clone())
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &Rc<Record>)> {
        self.records.iter().map(|(symbol, record)| (symbol.as_str(), record))
    }

    /// Instantiate every loaded module in load order into a fresh global
    /// frame: module `i` lands in global slot `i`, so an initializer can read
    /// the modules loaded before it.
    pub fn bootup(&self, vm: &mut Vm) -> Result<Vec<Rc<Instance>>> {
        self.bootup_with_globals(vm, 0)
    }

    /// Like [`bootup`](Self::bootup), with at least `globals` global slots.
    pub fn bootup_with_globals(&self, vm: &mut Vm, globals: usize) -> Result<Vec<Rc<Instance>>> {
        let globals = vm.init_globals(globals.max(self.records.len()));
        let mut instances = Vec::with_capacity(self.records.len());
        for (slot, (symbol, record)) in self.records.iter().enumerate() {
            let instance = vm
                .alloc(record)
                .with_context(|| format!("failed to initialize module '{}'", symbol))?;
            globals.set(slot, Value::Instance(instance.clone()))?;
            debug!(target: "pathvm::module", symbol = symbol.as_str(), slot, "module booted");
            instances.push(instance);
        }
        Ok(instances)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.get_module_names())
            .field("natives", &self.natives.len())
            .field("records", &self.records.len())
            .finish()
    }
}

/// A family of natives exported under one module name.
pub trait Module: fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn enabled(&self) -> bool {
        true
    }

    /// Every native of the module, named with its qualified name.
    fn natives(&self) -> Vec<Native>;

    fn register(&self, registry: &mut ModuleRegistry) -> Result<()> {
        for native in self.natives() {
            registry
                .register_native(native)
                .with_context(|| format!("while registering module '{}'", self.name()))?;
        }
        Ok(())
    }
}
