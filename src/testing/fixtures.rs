/// In-memory package builders for tests and benches.
///
/// Archives are assembled member by member so adversarial layouts (traversal
/// names, duplicate members, oversized payloads) can be produced on purpose.
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Required interface and method of the default catalog
pub const MODEL_INTERFACE: &str = "com/ttsudio/alphaback/Model";
pub const STEP_METHOD: &str = "simulateStep";
pub const STEP_DESCRIPTOR: &str = "(Lcom/ttsudio/alphaback/State;)Ljava/util/List;";

/// A source model that passes every check of the default catalog
pub const VALID_MODEL_SOURCE: &str = r#"import numpy as np
from collections import deque
from typing import List


class TradingModel:
    """Moving-average crossover."""

    def __init__(self, short_window: int = 5, long_window: int = 20):
        self.short_window = short_window
        self.long_window = long_window
        self.history = deque(maxlen=long_window)

    def predict(self, stock_prices: List[float], volume, timestamps) -> dict:
        prices = np.asarray(stock_prices, dtype=float)
        if len(prices) < self.long_window:
            return {"signal": "HOLD", "confidence": 0.0}
        short = prices[-self.short_window:].mean()
        long = prices[-self.long_window:].mean()
        spread = (short - long) / long
        signal = "BUY" if spread > 0 else "SELL"
        return {"signal": signal, "confidence": min(abs(spread) * 10, 1.0)}
"#;

enum Member {
    File(Vec<u8>),
    Dir,
}

/// Gzip-compressed tarball builder.
///
/// Member names are written verbatim into the header so `..` and `./` survive.
#[derive(Default)]
pub struct TarballBuilder {
    members: Vec<(String, Member)>,
}

impl TarballBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.members.push((name.to_string(), Member::File(data.to_vec())));
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.members.push((name.to_string(), Member::Dir));
        self
    }

    pub fn build(self) -> io::Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, member) in &self.members {
            let mut header = tar::Header::new_gnu();
            let raw = name.as_bytes();
            if raw.len() > 100 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("member name longer than 100 bytes: {}", name),
                ));
            }
            header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
            header.set_mtime(0);
            match member {
                Member::File(data) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(data.len() as u64);
                    header.set_cksum();
                    builder.append(&header, data.as_slice())?;
                }
                Member::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    header.set_cksum();
                    builder.append(&header, io::empty())?;
                }
            }
        }

        builder.into_inner()?.finish()
    }
}

/// Jar (zip) builder with deflated members
#[derive(Default)]
pub struct JarBuilder {
    members: Vec<(String, Vec<u8>)>,
}

impl JarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.members.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn build(self) -> io::Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in &self.members {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writer.write_all(data)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(cursor.into_inner())
    }
}

#[derive(Clone)]
enum PoolItem {
    Utf8(String),
    Class(u16),
    String(u16),
    NameAndType(u16, u16),
    Ref { tag: u8, class: u16, nat: u16 },
}

/// Synthetic class-file builder with a hand-assembled constant pool.
///
/// Methods carry no `Code` attribute; references are placed in the pool in the
/// order they are added.
pub struct ClassFileBuilder {
    major: u16,
    this_class: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    methods: Vec<(String, String)>,
    refs: Vec<Reference>,
}

#[derive(Clone)]
enum Reference {
    Class(String),
    String(String),
    Member {
        tag: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
}

impl ClassFileBuilder {
    pub fn new(this_class: &str) -> Self {
        Self {
            major: 52,
            this_class: this_class.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            methods: Vec::new(),
            refs: Vec::new(),
        }
    }

    /// Preconfigured model class: implements the model interface and declares
    /// the step method.
    pub fn model(this_class: &str) -> Self {
        Self::new(this_class)
            .implements(MODEL_INTERFACE)
            .method(STEP_METHOD, STEP_DESCRIPTOR)
    }

    pub fn major(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn super_class(mut self, name: Option<&str>) -> Self {
        self.super_class = name.map(str::to_string);
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn class_ref(mut self, name: &str) -> Self {
        self.refs.push(Reference::Class(name.to_string()));
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        self.refs.push(Reference::String(value.to_string()));
        self
    }

    pub fn field_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.member(9, owner, name, descriptor)
    }

    pub fn method_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.member(10, owner, name, descriptor)
    }

    pub fn interface_method_ref(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.member(11, owner, name, descriptor)
    }

    fn member(mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        self.refs.push(Reference::Member {
            tag,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();

        let this_index = pool.class(&self.this_class);
        let super_index = self.super_class.as_deref().map_or(0, |s| pool.class(s));
        let interface_indices: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        for reference in &self.refs {
            match reference {
                Reference::Class(name) => {
                    pool.class(name);
                }
                Reference::String(value) => {
                    let utf8 = pool.utf8(value);
                    pool.push(PoolItem::String(utf8));
                }
                Reference::Member {
                    tag,
                    owner,
                    name,
                    descriptor,
                } => {
                    let class = pool.class(owner);
                    let name = pool.utf8(name);
                    let descriptor = pool.utf8(descriptor);
                    let nat = pool.push(PoolItem::NameAndType(name, descriptor));
                    pool.push(PoolItem::Ref {
                        tag: *tag,
                        class,
                        nat,
                    });
                }
            }
        }

        let methods: Vec<(u16, u16)> = self
            .methods
            .iter()
            .map(|(name, descriptor)| (pool.utf8(name), pool.utf8(descriptor)))
            .collect();

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        pool.write(&mut out);

        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_index.to_be_bytes());
        out.extend_from_slice(&super_index.to_be_bytes());
        out.extend_from_slice(&(interface_indices.len() as u16).to_be_bytes());
        for index in &interface_indices {
            out.extend_from_slice(&index.to_be_bytes());
        }
        // fields
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&(methods.len() as u16).to_be_bytes());
        for (name, descriptor) in methods {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
        // class attributes
        out.extend_from_slice(&0u16.to_be_bytes());
        out
    }
}

#[derive(Default)]
struct Pool {
    items: Vec<PoolItem>,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn push(&mut self, item: PoolItem) -> u16 {
        self.items.push(item);
        self.items.len() as u16
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8s.get(value) {
            return *index;
        }
        let index = self.push(PoolItem::Utf8(value.to_string()));
        self.utf8s.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let utf8 = self.utf8(name);
        let index = self.push(PoolItem::Class(utf8));
        self.classes.insert(name.to_string(), index);
        index
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.items.len() as u16 + 1).to_be_bytes());
        for item in &self.items {
            match item {
                PoolItem::Utf8(value) => {
                    out.push(1);
                    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                    out.extend_from_slice(value.as_bytes());
                }
                PoolItem::Class(name) => {
                    out.push(7);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                PoolItem::String(utf8) => {
                    out.push(8);
                    out.extend_from_slice(&utf8.to_be_bytes());
                }
                PoolItem::NameAndType(name, descriptor) => {
                    out.push(12);
                    out.extend_from_slice(&name.to_be_bytes());
                    out.extend_from_slice(&descriptor.to_be_bytes());
                }
                PoolItem::Ref { tag, class, nat } => {
                    out.push(*tag);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
            }
        }
    }
}

/// Metadata document accepted for a source package
pub fn source_metadata() -> Value {
    json!({
        "model_id": "momentum_v1",
        "version": "1.0.0",
        "author": "quant research",
        "description": "Moving-average crossover",
        "timestamp": "2024-05-01T12:00:00Z",
        "expected_inputs": {
            "stock_prices": "list of closing prices",
            "volume": "list of traded volumes",
            "timestamps": "list of ISO-8601 timestamps"
        },
        "output_format": {
            "signal": "BUY | SELL | HOLD",
            "confidence": "float in [0, 1]"
        }
    })
}

/// Metadata document accepted for a bytecode package designating `model_class`
pub fn bytecode_metadata(model_class: &str) -> Value {
    let mut doc = source_metadata();
    doc["model_id"] = json!("momentum_jvm");
    doc["model_class"] = json!(model_class);
    doc
}

/// Source package holding `metadata.json` and `model.py`
pub fn source_package(model_py: &str, metadata: &Value) -> io::Result<Vec<u8>> {
    TarballBuilder::new()
        .file("metadata.json", metadata.to_string().as_bytes())
        .file("model.py", model_py.as_bytes())
        .build()
}

/// Bytecode package holding `metadata.json` and the given class entries
pub fn bytecode_package(metadata: &Value, classes: &[(&str, Vec<u8>)]) -> io::Result<Vec<u8>> {
    let mut builder = JarBuilder::new().file("metadata.json", metadata.to_string().as_bytes());
    for (name, bytes) in classes {
        builder = builder.file(name, bytes);
    }
    builder.build()
}

/// Valid bytecode package for `com.example.Momentum`
pub fn valid_bytecode_package() -> io::Result<Vec<u8>> {
    let class = ClassFileBuilder::model("com/example/Momentum")
        .method_ref("java/lang/Math", "max", "(DD)D")
        .method_ref("java/util/ArrayList", "<init>", "()V")
        .build();
    bytecode_package(
        &bytecode_metadata("com.example.Momentum"),
        &[("com/example/Momentum.class", class)],
    )
}
