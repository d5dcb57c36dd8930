/// Class-file header, constant pool and method table.
///
/// Parsing is two-phase: entries are read with the cursor, then every symbolic
/// reference is checked for range and target tag before the class is handed out.
/// Accessors can therefore resolve references without further checks.
use super::reader::ByteReader;
use super::ClassFormatError;

pub const MAGIC: u32 = 0xCAFE_BABE;
/// JDK 1.0.2
pub const MIN_MAJOR: u16 = 45;
/// JDK 26
pub const MAX_MAJOR: u16 = 70;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Slot 0 and the upper half of long/double entries
    Unusable,
    Utf8(String),
    Integer,
    Float,
    Long,
    Double,
    Class { name: u16 },
    String { utf8: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl Constant {
    fn tag_name(&self) -> &'static str {
        match self {
            Constant::Unusable => "unusable",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer => "Integer",
            Constant::Float => "Float",
            Constant::Long => "Long",
            Constant::Double => "Double",
            Constant::Class { .. } => "Class",
            Constant::String { .. } => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module { .. } => "Module",
            Constant::Package { .. } => "Package",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// Resolved field or method reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: MemberKind,
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.u16()? as usize;
        if count == 0 {
            return Err(ClassFormatError::Malformed(
                "constant_pool_count must be at least 1".to_string(),
            ));
        }
        // smallest entry is a tag plus a two-byte index
        reader.check_count("constant pool entries", count - 1, 3)?;

        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let index = entries.len();
            let tag = reader.u8()?;
            let entry = match tag {
                1 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.bytes(len)?;
                    Constant::Utf8(decode_modified_utf8(bytes).ok_or(
                        ClassFormatError::BadUtf8 {
                            index: index as u16,
                        },
                    )?)
                }
                3 => {
                    reader.skip(4)?;
                    Constant::Integer
                }
                4 => {
                    reader.skip(4)?;
                    Constant::Float
                }
                5 | 6 => {
                    reader.skip(8)?;
                    if index + 1 >= count {
                        return Err(ClassFormatError::Malformed(format!(
                            "8-byte constant at #{} overruns the pool",
                            index
                        )));
                    }
                    entries.push(if tag == 5 {
                        Constant::Long
                    } else {
                        Constant::Double
                    });
                    entries.push(Constant::Unusable);
                    continue;
                }
                7 => Constant::Class {
                    name: reader.u16()?,
                },
                8 => Constant::String {
                    utf8: reader.u16()?,
                },
                9 => Constant::FieldRef {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                10 => Constant::MethodRef {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                12 => Constant::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.u8()?,
                    reference: reader.u16()?,
                },
                16 => Constant::MethodType {
                    descriptor: reader.u16()?,
                },
                17 => Constant::Dynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                19 => Constant::Module {
                    name: reader.u16()?,
                },
                20 => Constant::Package {
                    name: reader.u16()?,
                },
                other => {
                    return Err(ClassFormatError::BadTag {
                        index: index as u16,
                        tag: other,
                    })
                }
            };
            entries.push(entry);
        }

        let pool = Self { entries };
        pool.check_references()?;
        Ok(pool)
    }

    fn check_references(&self) -> Result<(), ClassFormatError> {
        for (index, entry) in self.entries.iter().enumerate() {
            let at = index as u16;
            match *entry {
                Constant::Class { name } | Constant::Module { name } | Constant::Package { name } => {
                    self.expect(at, name, "Utf8")?;
                }
                Constant::String { utf8 } => self.expect(at, utf8, "Utf8")?,
                Constant::MethodType { descriptor } => self.expect(at, descriptor, "Utf8")?,
                Constant::NameAndType { name, descriptor } => {
                    self.expect(at, name, "Utf8")?;
                    self.expect(at, descriptor, "Utf8")?;
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    self.expect(at, class, "Class")?;
                    self.expect(at, name_and_type, "NameAndType")?;
                }
                Constant::Dynamic { name_and_type, .. }
                | Constant::InvokeDynamic { name_and_type, .. } => {
                    self.expect(at, name_and_type, "NameAndType")?;
                }
                Constant::MethodHandle { kind, reference } => {
                    let expected: &[&str] = match kind {
                        1..=4 => &["Fieldref"],
                        5 | 8 => &["Methodref"],
                        6 | 7 => &["Methodref", "InterfaceMethodref"],
                        9 => &["InterfaceMethodref"],
                        _ => {
                            return Err(ClassFormatError::Malformed(format!(
                                "method handle #{} has invalid kind {}",
                                at, kind
                            )))
                        }
                    };
                    let target = self.slot(at, reference)?;
                    if !expected.contains(&target.tag_name()) {
                        return Err(ClassFormatError::WrongTag {
                            at,
                            index: reference,
                            expected: expected[0],
                            found: target.tag_name(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn slot(&self, at: u16, index: u16) -> Result<&Constant, ClassFormatError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadIndex { at, index }),
            Some(entry) => Ok(entry),
        }
    }

    fn expect(&self, at: u16, index: u16, tag: &'static str) -> Result<(), ClassFormatError> {
        let entry = self.slot(at, index)?;
        if entry.tag_name() != tag {
            return Err(ClassFormatError::WrongTag {
                at,
                index,
                expected: tag,
                found: entry.tag_name(),
            });
        }
        Ok(())
    }

    /// Slot count including slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Usable entries with their indices, in pool order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.entries.get(index as usize)? {
            Constant::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.entries.get(index as usize)? {
            Constant::Class { name } => self.utf8(*name),
            _ => None,
        }
    }

    /// Resolve a field/method reference entry
    pub fn member(&self, index: u16) -> Option<MemberRef<'_>> {
        let (kind, class, nat) = match *self.entries.get(index as usize)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => (MemberKind::Field, class, name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
            } => (MemberKind::Method, class, name_and_type),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (MemberKind::InterfaceMethod, class, name_and_type),
            _ => return None,
        };
        let (name, descriptor) = match *self.entries.get(nat as usize)? {
            Constant::NameAndType { name, descriptor } => (name, descriptor),
            _ => return None,
        };
        Some(MemberRef {
            kind,
            owner: self.class_name(class)?,
            name: self.utf8(name)?,
            descriptor: self.utf8(descriptor)?,
        })
    }
}

/// Decode the JVM's modified UTF-8 (two-byte NUL, surrogate pairs as two
/// three-byte sequences).
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7f => {
                units.push(b as u16);
                i += 1;
            }
            0xc0..=0xdf => {
                let b2 = *bytes.get(i + 1)?;
                if b2 & 0xc0 != 0x80 {
                    return None;
                }
                units.push(((b as u16 & 0x1f) << 6) | (b2 as u16 & 0x3f));
                i += 2;
            }
            0xe0..=0xef => {
                let b2 = *bytes.get(i + 1)?;
                let b3 = *bytes.get(i + 2)?;
                if b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
                    return None;
                }
                units.push(((b as u16 & 0x0f) << 12) | ((b2 as u16 & 0x3f) << 6) | (b3 as u16 & 0x3f));
                i += 3;
            }
            _ => return None,
        }
    }
    Some(String::from_utf16_lossy(&units))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor: u16,
    pub major: u16,
    pub access: u16,
    pub pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    pub methods: Vec<MethodInfo>,
}

pub const ACC_INTERFACE: u16 = 0x0200;

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor = reader.u16()?;
        let major = reader.u16()?;
        if !(MIN_MAJOR..=MAX_MAJOR).contains(&major) {
            return Err(ClassFormatError::UnsupportedVersion { major, minor });
        }

        let pool = ConstantPool::parse(&mut reader)?;
        let access = reader.u16()?;

        let this_class = reader.u16()?;
        pool.expect(0, this_class, "Class")?;
        let super_class = reader.u16()?;
        if super_class != 0 {
            pool.expect(0, super_class, "Class")?;
        }

        let interface_count = reader.u16()? as usize;
        reader.check_count("interfaces", interface_count, 2)?;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            let index = reader.u16()?;
            pool.expect(0, index, "Class")?;
            interfaces.push(index);
        }

        // fields: same layout as methods, only validated and skipped
        skip_members(&mut reader, &pool, "fields")?;

        let method_count = reader.u16()? as usize;
        reader.check_count("methods", method_count, 8)?;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            let (access, name, descriptor) = read_member(&mut reader, &pool)?;
            methods.push(MethodInfo {
                access,
                name,
                descriptor,
            });
        }

        skip_attributes(&mut reader, &pool)?;
        reader.expect_end()?;

        Ok(Self {
            minor,
            major,
            access,
            pool,
            this_class,
            super_class,
            interfaces,
            methods,
        })
    }

    /// Internal name of the declared class
    pub fn this_class(&self) -> &str {
        self.pool.class_name(self.this_class).unwrap_or_default()
    }

    pub fn super_class(&self) -> Option<&str> {
        if self.super_class == 0 {
            return None;
        }
        self.pool.class_name(self.super_class)
    }

    /// Directly declared interfaces, in declaration order
    pub fn interfaces(&self) -> Vec<&str> {
        self.interfaces
            .iter()
            .filter_map(|index| self.pool.class_name(*index))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodInfo> {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

fn read_member(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<(u16, String, String), ClassFormatError> {
    let access = reader.u16()?;
    let name = reader.u16()?;
    let descriptor = reader.u16()?;
    pool.expect(0, name, "Utf8")?;
    pool.expect(0, descriptor, "Utf8")?;
    skip_attributes(reader, pool)?;
    Ok((
        access,
        pool.utf8(name).unwrap_or_default().to_string(),
        pool.utf8(descriptor).unwrap_or_default().to_string(),
    ))
}

fn skip_members(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    what: &'static str,
) -> Result<(), ClassFormatError> {
    let count = reader.u16()? as usize;
    reader.check_count(what, count, 8)?;
    for _ in 0..count {
        read_member(reader, pool)?;
    }
    Ok(())
}

fn skip_attributes(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<(), ClassFormatError> {
    let count = reader.u16()? as usize;
    reader.check_count("attributes", count, 6)?;
    for _ in 0..count {
        let name = reader.u16()?;
        pool.expect(0, name, "Utf8")?;
        let len = reader.u32()? as usize;
        reader.skip(len)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::ClassFileBuilder;

    #[test]
    fn test_parse_built_class() {
        let bytes = ClassFileBuilder::new("com/example/Momentum")
            .implements("com/ttsudio/alphaback/Model")
            .method("simulateStep", "(Lcom/ttsudio/alphaback/State;)Ljava/util/List;")
            .method_ref("java/lang/Math", "abs", "(I)I")
            .field_ref("java/lang/System", "out", "Ljava/io/PrintStream;")
            .build();

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class(), "com/example/Momentum");
        assert_eq!(class.super_class(), Some("java/lang/Object"));
        assert_eq!(class.interfaces(), vec!["com/ttsudio/alphaback/Model"]);
        assert_eq!(class.methods_named("simulateStep").count(), 1);

        let members: Vec<MemberRef<'_>> = class
            .pool
            .iter()
            .filter_map(|(i, _)| class.pool.member(i))
            .collect();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].owner, "java/lang/Math");
        assert_eq!(members[1].kind, MemberKind::Field);
    }

    #[test]
    fn test_bad_magic_and_version() {
        assert!(matches!(
            ClassFile::parse(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52]),
            Err(ClassFormatError::BadMagic(0xdead_beef))
        ));
        assert!(matches!(
            ClassFile::parse(&[0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 99]),
            Err(ClassFormatError::UnsupportedVersion { major: 99, .. })
        ));
    }

    #[test]
    fn test_every_truncation_is_an_error() {
        let bytes = ClassFileBuilder::new("A")
            .method("run", "()V")
            .method_ref("java/io/File", "<init>", "(Ljava/lang/String;)V")
            .build();
        for len in 0..bytes.len() {
            assert!(ClassFile::parse(&bytes[..len]).is_err(), "prefix {}", len);
        }
        assert!(ClassFile::parse(&bytes).is_ok());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = ClassFileBuilder::new("A").build();
        bytes.push(0);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_out_of_range_and_wrong_tag_references() {
        // pool: #1 Class -> #9 (out of range)
        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52, 0, 2, 7, 0, 9];
        bytes.extend_from_slice(&[0; 10]);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::BadIndex { at: 1, index: 9 })
        ));

        // pool: #1 Class -> #1 (self reference, wrong tag)
        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52, 0, 2, 7, 0, 1];
        bytes.extend_from_slice(&[0; 10]);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::WrongTag { at: 1, index: 1, .. })
        ));
    }

    #[test]
    fn test_huge_declared_pool_count_rejected_before_allocation() {
        let bytes = [0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52, 0xff, 0xff, 1, 0, 0];
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFormatError::CountExceedsInput { .. })
        ));
    }

    #[test]
    fn test_long_takes_two_slots() {
        // #1 Long, #2 unusable, #3 Utf8 "A", #4 Class -> #3
        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 52, 0, 5];
        bytes.extend_from_slice(&[5, 0, 0, 0, 0, 0, 0, 0, 1]);
        bytes.extend_from_slice(&[1, 0, 1, b'A']);
        bytes.extend_from_slice(&[7, 0, 3]);
        // access, this=#4, super=0, no interfaces/fields/methods/attributes
        bytes.extend_from_slice(&[0, 0x21, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.this_class(), "A");
        assert_eq!(class.super_class(), None);
        assert_eq!(class.pool.len(), 5);
        assert_eq!(class.pool.iter().count(), 3);
    }

    #[test]
    fn test_modified_utf8() {
        assert_eq!(decode_modified_utf8(b"java/io").as_deref(), Some("java/io"));
        assert_eq!(decode_modified_utf8(&[0xc0, 0x80]).as_deref(), Some("\0"));
        assert_eq!(decode_modified_utf8(&[0xc3, 0xa9]).as_deref(), Some("é"));
        assert_eq!(decode_modified_utf8(&[0x00]), None);
        assert_eq!(decode_modified_utf8(&[0xe0, 0x80]), None);
        assert_eq!(decode_modified_utf8(&[0xf0, 0x9f, 0x98, 0x80]), None);
    }
}
