//! Minimal JVM class-file reader.
//!
//! Reads just what plugin discovery and class-reference checks need: the
//! constant pool, the class hierarchy, static constant fields, and method
//! bodies. Attributes other than `Code` and `ConstantValue` are skipped.

use std::fmt;

const MAGIC: u32 = 0xCAFE_BABE;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_PUBLIC: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle,
    MethodType(u16),
    Dynamic { name_and_type: u16 },
    InvokeDynamic { name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0 and the second slot of long/double entries.
    Unusable,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub constant_value: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<Vec<u8>>,
}

impl MethodInfo {
    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }
}

/// A member reference resolved through the constant pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
/// A parsed class. Names use the dotted Java form (`a.b.C`).
pub struct ClassFile {
    pub constants: Vec<Constant>,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFormatError(pub String);

impl fmt::Display for ClassFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Parse<T> = Result<T, ClassFormatError>;

fn err<T>(msg: impl Into<String>) -> Parse<T> {
    Err(ClassFormatError(msg.into()))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Parse<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.buf.len());
        match end {
            Some(end) => {
                let s = &self.buf[self.pos..end];
                self.pos = end;
                Ok(s)
            }
            None => err(format!("unexpected end of data at offset {}", self.pos)),
        }
    }
    fn u1(&mut self) -> Parse<u8> {
        Ok(self.bytes(1)?[0])
    }
    fn u2(&mut self) -> Parse<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
    fn u4(&mut self) -> Parse<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
    fn u8(&mut self) -> Parse<u64> {
        let hi = self.u4()? as u64;
        let lo = self.u4()? as u64;
        Ok((hi << 32) | lo)
    }
}

/// Convert an internal binary name (`a/b/C`) to the dotted form.
pub fn dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> Parse<ClassFile> {
        let mut r = Reader { buf: data, pos: 0 };
        if r.u4()? != MAGIC {
            return err("bad magic number");
        }
        let _minor = r.u2()?;
        let _major = r.u2()?;
        let constants = read_constant_pool(&mut r)?;
        let mut cf = ClassFile {
            constants,
            access_flags: 0,
            this_class: String::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        cf.access_flags = r.u2()?;
        let this_idx = r.u2()?;
        cf.this_class = cf.class_name(this_idx)?;
        let super_idx = r.u2()?;
        if super_idx != 0 {
            cf.super_class = Some(cf.class_name(super_idx)?);
        }
        let n_ifaces = r.u2()?;
        for _ in 0..n_ifaces {
            let idx = r.u2()?;
            let name = cf.class_name(idx)?;
            cf.interfaces.push(name);
        }
        let n_fields = r.u2()?;
        for _ in 0..n_fields {
            let access_flags = r.u2()?;
            let name = cf.utf8(r.u2()?)?.to_string();
            let descriptor = cf.utf8(r.u2()?)?.to_string();
            let mut constant_value = None;
            let n_attrs = r.u2()?;
            for _ in 0..n_attrs {
                let attr_name = cf.utf8(r.u2()?)?.to_string();
                let len = r.u4()? as usize;
                let body = r.bytes(len)?;
                if attr_name == "ConstantValue" && body.len() == 2 {
                    constant_value = Some(u16::from_be_bytes([body[0], body[1]]));
                }
            }
            cf.fields.push(FieldInfo {
                access_flags,
                name,
                descriptor,
                constant_value,
            });
        }
        let n_methods = r.u2()?;
        for _ in 0..n_methods {
            let access_flags = r.u2()?;
            let name = cf.utf8(r.u2()?)?.to_string();
            let descriptor = cf.utf8(r.u2()?)?.to_string();
            let mut code = None;
            let n_attrs = r.u2()?;
            for _ in 0..n_attrs {
                let attr_name = cf.utf8(r.u2()?)?.to_string();
                let len = r.u4()? as usize;
                let body = r.bytes(len)?;
                if attr_name == "Code" {
                    code = Some(read_code(body)?);
                }
            }
            cf.methods.push(MethodInfo {
                access_flags,
                name,
                descriptor,
                code,
            });
        }
        Ok(cf)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// True when the class declares `public <init>()`.
    pub fn has_public_no_arg_constructor(&self) -> bool {
        self.method("<init>", "()V")
            .is_some_and(|m| m.access_flags & ACC_PUBLIC != 0)
    }

    pub fn constant(&self, idx: u16) -> Parse<&Constant> {
        match self.constants.get(idx as usize) {
            Some(Constant::Unusable) | None => err(format!("invalid constant index {}", idx)),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, idx: u16) -> Parse<&str> {
        match self.constant(idx)? {
            Constant::Utf8(s) => Ok(s),
            other => err(format!("constant {} is not Utf8: {:?}", idx, other)),
        }
    }

    pub fn class_name(&self, idx: u16) -> Parse<String> {
        match self.constant(idx)? {
            Constant::Class(name) => Ok(dotted(self.utf8(*name)?)),
            other => err(format!("constant {} is not a class: {:?}", idx, other)),
        }
    }

    pub fn member_ref(&self, idx: u16) -> Parse<MemberRef> {
        let (class, nat) = match self.constant(idx)? {
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
            } => (*class, *name_and_type),
            other => return err(format!("constant {} is not a member ref: {:?}", idx, other)),
        };
        let (name, descriptor) = match self.constant(nat)? {
            Constant::NameAndType { name, descriptor } => (*name, *descriptor),
            other => return err(format!("constant {} is not NameAndType: {:?}", nat, other)),
        };
        Ok(MemberRef {
            class: self.class_name(class)?,
            name: self.utf8(name)?.to_string(),
            descriptor: self.utf8(descriptor)?.to_string(),
        })
    }

    /// Find a method declared in this class by name and descriptor.
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn read_constant_pool(r: &mut Reader<'_>) -> Parse<Vec<Constant>> {
    let count = r.u2()? as usize;
    let mut pool = Vec::with_capacity(count);
    pool.push(Constant::Unusable);
    while pool.len() < count {
        let tag = r.u1()?;
        let c = match tag {
            1 => {
                let len = r.u2()? as usize;
                Constant::Utf8(String::from_utf8_lossy(r.bytes(len)?).into_owned())
            }
            3 => Constant::Integer(r.u4()? as i32),
            4 => Constant::Float(f32::from_bits(r.u4()?)),
            5 => Constant::Long(r.u8()? as i64),
            6 => Constant::Double(f64::from_bits(r.u8()?)),
            7 => Constant::Class(r.u2()?),
            8 => Constant::String(r.u2()?),
            9 => Constant::FieldRef {
                class: r.u2()?,
                name_and_type: r.u2()?,
            },
            10 => Constant::MethodRef {
                class: r.u2()?,
                name_and_type: r.u2()?,
            },
            11 => Constant::InterfaceMethodRef {
                class: r.u2()?,
                name_and_type: r.u2()?,
            },
            12 => Constant::NameAndType {
                name: r.u2()?,
                descriptor: r.u2()?,
            },
            15 => {
                r.bytes(3)?;
                Constant::MethodHandle
            }
            16 => Constant::MethodType(r.u2()?),
            17 => {
                let _bootstrap = r.u2()?;
                Constant::Dynamic {
                    name_and_type: r.u2()?,
                }
            }
            18 => {
                let _bootstrap = r.u2()?;
                Constant::InvokeDynamic {
                    name_and_type: r.u2()?,
                }
            }
            19 => Constant::Module(r.u2()?),
            20 => Constant::Package(r.u2()?),
            other => return err(format!("unknown constant tag {}", other)),
        };
        let wide = matches!(c, Constant::Long(_) | Constant::Double(_));
        pool.push(c);
        if wide {
            pool.push(Constant::Unusable);
        }
    }
    Ok(pool)
}

fn read_code(body: &[u8]) -> Parse<Vec<u8>> {
    let mut r = Reader { buf: body, pos: 0 };
    let _max_stack = r.u2()?;
    let _max_locals = r.u2()?;
    let len = r.u4()? as usize;
    Ok(r.bytes(len)?.to_vec())
}

/// Parameter and return types of a method descriptor, e.g.
/// `(Ljava/lang/Object;[I)Ljava/util/List;`.
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<String>, String)> {
    let inner = desc.strip_prefix('(')?;
    let close = inner.find(')')?;
    let (params_str, ret) = (&inner[..close], &inner[close + 1..]);
    let mut params = Vec::new();
    let bytes = params_str.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while bytes[i] == b'[' {
            i += 1;
            if i >= bytes.len() {
                return None;
            }
        }
        if bytes[i] == b'L' {
            let semi = params_str[i..].find(';')?;
            i += semi + 1;
        } else {
            i += 1;
        }
        params.push(params_str[start..i].to_string());
    }
    Some((params, ret.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_parse_hierarchy_and_methods() {
        let bytes = plugin_definition(
            "org.example.PingProcessPluginDefinition",
            V2_CONTRACT,
            "ping",
            &["bpe/ping.bpmn"],
            &[("dsfdev_ping", vec!["fhir/ActivityDefinition/ping.xml"])],
        );
        let cf = ClassFile::parse(&bytes).unwrap();
        assert_eq!(cf.this_class, "org.example.PingProcessPluginDefinition");
        assert_eq!(cf.super_class.as_deref(), Some("java.lang.Object"));
        assert_eq!(cf.interfaces, vec![V2_CONTRACT.to_string()]);
        let m = cf.method("getName", "()Ljava/lang/String;").unwrap();
        assert!(!m.is_abstract());
        assert!(m.code.as_ref().is_some_and(|c| !c.is_empty()));
        assert!(cf.constants.iter().any(|c| match c {
            Constant::String(i) => cf.utf8(*i) == Ok("bpe/ping.bpmn"),
            _ => false,
        }));
        assert!(cf.has_public_no_arg_constructor());
        assert!(!cf.is_abstract());
    }

    #[test]
    fn test_static_constant_field_has_value() {
        let bytes = ClassBuilder::new("org.example.Constants")
            .string_constant("PROCESS", "dsfdev_ping")
            .build();
        let cf = ClassFile::parse(&bytes).unwrap();
        let f = cf.field("PROCESS").unwrap();
        let idx = f.constant_value.unwrap();
        match cf.constant(idx).unwrap() {
            Constant::String(s) => assert_eq!(cf.utf8(*s).unwrap(), "dsfdev_ping"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ClassFile::parse(b"not a class").is_err());
        let mut truncated = plugin_definition("a.B", V1_CONTRACT, "b", &[], &[]);
        truncated.truncate(20);
        assert!(ClassFile::parse(&truncated).is_err());
    }

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) =
            parse_method_descriptor("(Ljava/lang/Object;[Ljava/lang/Object;I)Ljava/util/List;")
                .unwrap();
        assert_eq!(
            params,
            vec!["Ljava/lang/Object;", "[Ljava/lang/Object;", "I"]
        );
        assert_eq!(ret, "Ljava/util/List;");
        let (none, v) = parse_method_descriptor("()V").unwrap();
        assert!(none.is_empty());
        assert_eq!(v, "V");
    }
}
