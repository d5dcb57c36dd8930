/// Versioned rule catalogs
///
/// Presets are immutable and versioned. A change to any table ships as a new preset
/// id rather than an edit of an existing one, so a report can always be traced back
/// to the exact rules that produced it.
use crate::config::catalog::{BytecodeRules, Limits, MetadataRules, RuleCatalog, SourceRules};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;

pub const DEFAULT_PRESET: &str = "alphaback-v1";

const MIB: u64 = 1024 * 1024;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

static ALPHABACK_V1: Lazy<RuleCatalog> = Lazy::new(|| RuleCatalog {
    id: DEFAULT_PRESET.to_string(),
    limits: Limits {
        max_package_bytes: 10 * MIB,
        max_decompressed_bytes: 50 * MIB,
        max_entries: 512,
        budget_ms: 5_000,
    },
    metadata: MetadataRules {
        entry_name: "metadata.json".to_string(),
        required_fields: list(&[
            "model_id",
            "version",
            "author",
            "expected_inputs",
            "output_format",
        ]),
        bytecode_required_fields: list(&["model_class"]),
        model_id_pattern: r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$".to_string(),
        version_pattern: r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$".to_string(),
        model_class_pattern: r"^[A-Za-z_$][A-Za-z0-9_$]*(?:\.[A-Za-z_$][A-Za-z0-9_$]*)+$"
            .to_string(),
        required_inputs: list(&["stock_prices", "volume", "timestamps"]),
        required_outputs: list(&["signal", "confidence"]),
    },
    source: SourceRules {
        entry_name: "model.py".to_string(),
        required_class: "TradingModel".to_string(),
        required_method: "predict".to_string(),
        required_params: list(&["self", "stock_prices", "volume", "timestamps"]),
        allowed_imports: set(&[
            "numpy",
            "pandas",
            "math",
            "statistics",
            "datetime",
            "typing",
            "collections",
            "itertools",
            "functools",
            "dataclasses",
            "enum",
            "decimal",
            "fractions",
            "abc",
            "__future__",
        ]),
        blocked_imports: set(&[
            "os",
            "sys",
            "subprocess",
            "socket",
            "shutil",
            "pathlib",
            "io",
            "glob",
            "tempfile",
            "requests",
            "urllib",
            "urllib3",
            "http",
            "httpx",
            "ftplib",
            "smtplib",
            "telnetlib",
            "asyncio",
            "multiprocessing",
            "threading",
            "signal",
            "ctypes",
            "importlib",
            "pickle",
            "marshal",
            "shelve",
            "builtins",
            "inspect",
            "code",
            "pty",
        ]),
        blocked_builtins: set(&[
            "eval",
            "exec",
            "compile",
            "__import__",
            "open",
            "input",
            "globals",
            "locals",
            "vars",
            "getattr",
            "setattr",
            "delattr",
            "breakpoint",
            "memoryview",
        ]),
        file_methods: set(&["write", "read", "remove", "unlink", "mkdir", "rmdir"]),
        file_modules: set(&["os", "shutil", "pathlib", "io", "tempfile", "glob"]),
        network_methods: set(&["connect", "send", "recv", "sendall", "request", "urlopen"]),
        network_modules: set(&[
            "socket", "requests", "urllib", "urllib3", "http", "httpx", "ftplib", "smtplib",
        ]),
        file_functions: set(&[
            "numpy.load*",
            "numpy.save*",
            "numpy.fromfile",
            "numpy.fromregex",
            "numpy.genfromtxt",
            "numpy.memmap",
            "pandas.read_*",
            "pandas.HDFStore",
            "pandas.ExcelFile",
            "pandas.ExcelWriter",
            "*.to_csv",
            "*.to_pickle",
            "*.to_parquet",
            "*.to_feather",
            "*.to_hdf",
            "*.to_excel",
            "*.to_stata",
            "*.tofile",
            "*.dump",
        ]),
        network_functions: set(&["numpy.DataSource", "*.to_sql", "*.to_gbq"]),
        dangerous_attributes: set(&[
            "__globals__",
            "__builtins__",
            "__code__",
            "__import__",
            "__subclasses__",
            "__loader__",
        ]),
        dangerous_names: set(&["__builtins__", "__loader__", "__spec__"]),
    },
    bytecode: BytecodeRules {
        required_interface: "com/ttsudio/alphaback/Model".to_string(),
        required_method: "simulateStep".to_string(),
        required_descriptor: "(Lcom/ttsudio/alphaback/State;)Ljava/util/List;".to_string(),
        blocked_packages: set(&[
            "java/io",
            "java/nio/file",
            "java/nio/channels",
            "java/net",
            "java/lang/reflect",
            "java/rmi",
            "javax/net",
            "javax/script",
            "sun/misc",
            "jdk/internal",
        ]),
        blocked_classes: set(&[
            "java/lang/Runtime",
            "java/lang/System",
            "java/lang/ProcessBuilder",
            "java/lang/Process",
            "java/lang/ClassLoader",
            "java/lang/Thread",
            "java/net/URLClassLoader",
            // Lambdas and string concatenation only reach java/lang/invoke through
            // bootstrap handles and the MethodHandles$Lookup inner-class entry
            "java/lang/invoke/MethodHandle",
            "java/lang/invoke/MethodHandleProxies",
            "java/lang/invoke/VarHandle",
        ]),
        // Owners must stay unblocked as classes for a rule to fire
        blocked_methods: set(&[
            "java/lang/invoke/MethodHandles.lookup",
            "java/lang/invoke/MethodHandles.privateLookupIn",
            "java/lang/invoke/MethodHandles$Lookup.findClass",
            "java/lang/invoke/MethodHandles$Lookup.findConstructor",
            "java/lang/invoke/MethodHandles$Lookup.findSpecial",
            "java/lang/invoke/MethodHandles$Lookup.findStatic",
            "java/lang/invoke/MethodHandles$Lookup.findVirtual",
            "java/lang/invoke/MethodHandles$Lookup.defineClass",
            "java/lang/invoke/MethodHandles$Lookup.unreflect",
            "java/lang/Class.forName",
            "java/lang/Class.getDeclaredMethod",
            "java/lang/Class.getMethod",
            "java/lang/Class.newInstance",
        ]),
    },
});

/// Default preset for the alphaback simulator
pub fn alphaback_v1() -> &'static RuleCatalog {
    &ALPHABACK_V1
}

/// Look up a preset by id
pub fn get(id: &str) -> Option<&'static RuleCatalog> {
    match id {
        DEFAULT_PRESET => Some(alphaback_v1()),
        _ => None,
    }
}

/// List available preset ids
pub fn list_presets() -> Vec<&'static str> {
    vec![DEFAULT_PRESET]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert!(get("alphaback-v1").is_some());
        assert!(get("alphaback-v0").is_none());
        assert_eq!(list_presets(), vec!["alphaback-v1"]);
    }

    #[test]
    fn test_preset_limits() {
        let limits = &alphaback_v1().limits;
        assert_eq!(limits.max_package_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.max_decompressed_bytes, 50 * 1024 * 1024);
        assert_eq!(limits.budget().as_millis(), 5000);
    }

    #[test]
    fn test_preset_lists_are_disjoint() {
        let source = &alphaback_v1().source;
        assert!(source.allowed_imports.is_disjoint(&source.blocked_imports));
    }
}
