//! Symbolic evaluation of simple getter bodies.
//!
//! Plugin definitions return constant data (`getName`, `getProcessModels`,
//! `getFhirResourcesByProcessId`). javac compiles those to straight-line
//! code that loads constants and calls collection factories, so a small
//! stack machine over a subset of the JVM instruction set is enough to
//! recover the values without running a JVM. Anything outside the subset
//! (branches, arbitrary calls) fails with a reason string.

use super::classfile::{parse_method_descriptor, ClassFile, Constant, MethodInfo};
use super::ClassPath;
use std::collections::HashMap;

const MAX_STEPS: usize = 10_000;
const MAX_DEPTH: usize = 16;

/// A materialized value produced by a getter.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Null,
    Int(i64),
    Str(String),
    List(Vec<Evaluated>),
    Map(Vec<(Evaluated, Evaluated)>),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null,
    This,
    Int(i64),
    Str(String),
    Ref(usize),
}

#[derive(Debug, Clone)]
enum Obj {
    /// Allocated by `new`, waiting for its constructor.
    Uninit(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Array(Vec<Value>),
    Entry(Value, Value),
}

const LIST_CLASSES: &[&str] = &[
    "java.util.ArrayList",
    "java.util.LinkedList",
    "java.util.HashSet",
    "java.util.LinkedHashSet",
    "java.util.TreeSet",
];
const MAP_CLASSES: &[&str] = &[
    "java.util.HashMap",
    "java.util.LinkedHashMap",
    "java.util.TreeMap",
];

struct Machine<'a> {
    classpath: &'a ClassPath,
    class: &'a ClassFile,
    stack: Vec<Value>,
    locals: HashMap<u16, Value>,
    heap: Vec<Obj>,
}

type Step<T> = Result<T, String>;

/// Evaluate `method` of `class` and return the value it yields.
pub fn evaluate(classpath: &ClassPath, class: &ClassFile, method: &MethodInfo) -> Step<Evaluated> {
    let code = method
        .code
        .as_deref()
        .ok_or_else(|| "method has no code".to_string())?;
    let mut m = Machine {
        classpath,
        class,
        stack: Vec::new(),
        locals: HashMap::from([(0, Value::This)]),
        heap: Vec::new(),
    };
    let ret = m.run(code)?;
    m.materialize(&ret, 0)
}

fn read_u1(code: &[u8], at: usize) -> Step<u8> {
    code.get(at)
        .copied()
        .ok_or_else(|| format!("truncated code at {}", at))
}

fn read_u2(code: &[u8], at: usize) -> Step<u16> {
    Ok(u16::from_be_bytes([read_u1(code, at)?, read_u1(code, at + 1)?]))
}

impl<'a> Machine<'a> {
    fn pop(&mut self) -> Step<Value> {
        self.stack
            .pop()
            .ok_or_else(|| "operand stack underflow".to_string())
    }

    fn alloc(&mut self, o: Obj) -> Value {
        self.heap.push(o);
        Value::Ref(self.heap.len() - 1)
    }

    fn obj(&mut self, v: &Value) -> Step<&mut Obj> {
        match v {
            Value::Ref(i) => self
                .heap
                .get_mut(*i)
                .ok_or_else(|| "dangling reference".to_string()),
            other => Err(format!("expected object reference, got {:?}", other)),
        }
    }

    fn run(&mut self, code: &[u8]) -> Step<Value> {
        let mut pc = 0usize;
        for _ in 0..MAX_STEPS {
            let op = read_u1(code, pc)?;
            match op {
                0x00 => pc += 1,
                0x01 => {
                    self.stack.push(Value::Null);
                    pc += 1;
                }
                0x02..=0x08 => {
                    self.stack.push(Value::Int(op as i64 - 3));
                    pc += 1;
                }
                0x10 => {
                    self.stack.push(Value::Int(read_u1(code, pc + 1)? as i8 as i64));
                    pc += 2;
                }
                0x11 => {
                    self.stack.push(Value::Int(read_u2(code, pc + 1)? as i16 as i64));
                    pc += 3;
                }
                0x12 => {
                    let v = self.load_constant(read_u1(code, pc + 1)? as u16)?;
                    self.stack.push(v);
                    pc += 2;
                }
                0x13 => {
                    let v = self.load_constant(read_u2(code, pc + 1)?)?;
                    self.stack.push(v);
                    pc += 3;
                }
                0x19 => {
                    let v = self.load_local(read_u1(code, pc + 1)? as u16)?;
                    self.stack.push(v);
                    pc += 2;
                }
                0x2a..=0x2d => {
                    let v = self.load_local((op - 0x2a) as u16)?;
                    self.stack.push(v);
                    pc += 1;
                }
                0x3a => {
                    let v = self.pop()?;
                    self.locals.insert(read_u1(code, pc + 1)? as u16, v);
                    pc += 2;
                }
                0x4b..=0x4e => {
                    let v = self.pop()?;
                    self.locals.insert((op - 0x4b) as u16, v);
                    pc += 1;
                }
                0x53 => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let array = self.pop()?;
                    let i = match index {
                        Value::Int(i) if i >= 0 => i as usize,
                        other => return Err(format!("bad array index {:?}", other)),
                    };
                    match self.obj(&array)? {
                        Obj::Array(items) if i < items.len() => items[i] = value,
                        _ => return Err("aastore outside array bounds".into()),
                    }
                    pc += 1;
                }
                0x57 => {
                    self.pop()?;
                    pc += 1;
                }
                0x59 => {
                    let v = self.stack.last().cloned().ok_or("dup on empty stack")?;
                    self.stack.push(v);
                    pc += 1;
                }
                0xb0 => return self.pop(),
                0xb2 => {
                    let v = self.get_static(read_u2(code, pc + 1)?)?;
                    self.stack.push(v);
                    pc += 3;
                }
                0xb6 | 0xb7 | 0xb8 => {
                    self.invoke(read_u2(code, pc + 1)?, op == 0xb8)?;
                    pc += 3;
                }
                0xb9 => {
                    self.invoke(read_u2(code, pc + 1)?, false)?;
                    pc += 5;
                }
                0xbb => {
                    let class = self.class.class_name(read_u2(code, pc + 1)?).map_err(|e| e.0)?;
                    let v = self.alloc(Obj::Uninit(class));
                    self.stack.push(v);
                    pc += 3;
                }
                0xbd => {
                    let n = match self.pop()? {
                        Value::Int(n) if (0..=4096).contains(&n) => n as usize,
                        other => return Err(format!("bad array length {:?}", other)),
                    };
                    let v = self.alloc(Obj::Array(vec![Value::Null; n]));
                    self.stack.push(v);
                    pc += 3;
                }
                0xc0 => pc += 3,
                other => return Err(format!("unsupported instruction 0x{:02x} at {}", other, pc)),
            }
        }
        Err("step limit exceeded".into())
    }

    fn load_local(&self, slot: u16) -> Step<Value> {
        self.locals
            .get(&slot)
            .cloned()
            .ok_or_else(|| format!("local {} read before assignment", slot))
    }

    fn load_constant(&self, idx: u16) -> Step<Value> {
        constant_value(self.class, idx)
    }

    fn get_static(&self, idx: u16) -> Step<Value> {
        let field = self.class.member_ref(idx).map_err(|e| e.0)?;
        let owner = if field.class == self.class.this_class {
            None
        } else {
            Some(
                self.classpath
                    .load_class(&field.class)
                    .map_err(|e| format!("cannot load {}: {}", field.class, e))?,
            )
        };
        let cf: &ClassFile = owner.as_deref().unwrap_or(self.class);
        let info = cf
            .field(&field.name)
            .ok_or_else(|| format!("field {}.{} not found", field.class, field.name))?;
        let cv = info.constant_value.ok_or_else(|| {
            format!("field {}.{} is not a compile-time constant", field.class, field.name)
        })?;
        constant_value(cf, cv)
    }

    fn invoke(&mut self, idx: u16, is_static: bool) -> Step<()> {
        let target = self.class.member_ref(idx).map_err(|e| e.0)?;
        let (params, ret) = parse_method_descriptor(&target.descriptor)
            .ok_or_else(|| format!("bad descriptor {}", target.descriptor))?;
        let mut args = Vec::with_capacity(params.len());
        for _ in 0..params.len() {
            args.push(self.pop()?);
        }
        args.reverse();
        let result = if is_static {
            Some(self.invoke_static(&target.class, &target.name, &params, args)?)
        } else {
            let receiver = self.pop()?;
            self.invoke_instance(&target.class, &target.name, receiver, args)?
        };
        if ret != "V" {
            self.stack.push(result.unwrap_or(Value::Null));
        }
        Ok(())
    }

    fn array_items(&mut self, v: &Value) -> Step<Vec<Value>> {
        match self.obj(v)? {
            Obj::Array(items) | Obj::List(items) => Ok(items.clone()),
            _ => Err("expected array".into()),
        }
    }

    fn varargs(&mut self, params: &[String], args: Vec<Value>) -> Step<Vec<Value>> {
        if params.len() == 1 && params[0].starts_with('[') {
            self.array_items(&args[0])
        } else {
            Ok(args)
        }
    }

    fn map_pairs(&mut self, v: &Value) -> Step<Vec<(Value, Value)>> {
        match self.obj(v)? {
            Obj::Map(pairs) => Ok(pairs.clone()),
            _ => Err("expected map".into()),
        }
    }

    fn invoke_static(
        &mut self,
        class: &str,
        name: &str,
        params: &[String],
        args: Vec<Value>,
    ) -> Step<Value> {
        match (class, name) {
            ("java.util.List" | "java.util.Set", "of") | ("java.util.Arrays", "asList") => {
                let items = self.varargs(params, args)?;
                Ok(self.alloc(Obj::List(items)))
            }
            ("java.util.List" | "java.util.Set", "copyOf")
            | ("java.util.Collections", "unmodifiableList" | "unmodifiableSet")
            | ("java.util.Collections", "unmodifiableMap")
            | ("java.util.Map", "copyOf")
            | ("java.lang.String", "valueOf") => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            ("java.util.Collections", "singletonList" | "singleton") => {
                Ok(self.alloc(Obj::List(args)))
            }
            ("java.util.Collections", "emptyList" | "emptySet") => {
                Ok(self.alloc(Obj::List(vec![])))
            }
            ("java.util.Collections", "emptyMap") => Ok(self.alloc(Obj::Map(vec![]))),
            ("java.util.Collections", "singletonMap") | ("java.util.Map", "of") => {
                if args.len() % 2 != 0 {
                    return Err("odd number of Map.of arguments".into());
                }
                let mut it = args.into_iter();
                let mut pairs = Vec::new();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    pairs.push((k, v));
                }
                Ok(self.alloc(Obj::Map(pairs)))
            }
            ("java.util.Map", "entry") => {
                let mut it = args.into_iter();
                let k = it.next().unwrap_or(Value::Null);
                let v = it.next().unwrap_or(Value::Null);
                Ok(self.alloc(Obj::Entry(k, v)))
            }
            ("java.util.Map", "ofEntries") => {
                let entries = self.varargs(params, args)?;
                let mut pairs = Vec::new();
                for e in &entries {
                    match self.obj(e)? {
                        Obj::Entry(k, v) => pairs.push((k.clone(), v.clone())),
                        _ => return Err("Map.ofEntries expects entries".into()),
                    }
                }
                Ok(self.alloc(Obj::Map(pairs)))
            }
            _ => Err(format!("unsupported call {}.{}", class, name)),
        }
    }

    fn invoke_instance(
        &mut self,
        class: &str,
        name: &str,
        receiver: Value,
        args: Vec<Value>,
    ) -> Step<Option<Value>> {
        if name == "<init>" {
            let kind = match self.obj(&receiver)? {
                Obj::Uninit(c) => c.clone(),
                _ => return Err("constructor on initialized object".into()),
            };
            let init = if LIST_CLASSES.contains(&kind.as_str()) {
                match args.first() {
                    Some(src @ Value::Ref(_)) => Obj::List(self.array_items(src)?),
                    _ => Obj::List(Vec::new()),
                }
            } else if MAP_CLASSES.contains(&kind.as_str()) {
                match args.first() {
                    Some(src @ Value::Ref(_)) => Obj::Map(self.map_pairs(src)?),
                    _ => Obj::Map(Vec::new()),
                }
            } else if kind == "java.lang.Object" || class == "java.lang.Object" {
                return Err("plain object construction".into());
            } else {
                return Err(format!("unsupported constructor {}", kind));
            };
            *self.obj(&receiver)? = init;
            return Ok(None);
        }
        let mut args = args.into_iter();
        match name {
            "add" => {
                let v = args.next().ok_or("add without argument")?;
                match self.obj(&receiver)? {
                    Obj::List(items) => items.push(v),
                    _ => return Err("add on non-list".into()),
                }
                Ok(Some(Value::Int(1)))
            }
            "addAll" => {
                let src = args.next().ok_or("addAll without argument")?;
                let extra = self.array_items(&src)?;
                match self.obj(&receiver)? {
                    Obj::List(items) => items.extend(extra),
                    _ => return Err("addAll on non-list".into()),
                }
                Ok(Some(Value::Int(1)))
            }
            "put" => {
                let k = args.next().ok_or("put without key")?;
                let v = args.next().ok_or("put without value")?;
                match self.obj(&receiver)? {
                    Obj::Map(pairs) => {
                        if let Some(slot) = pairs.iter_mut().find(|(pk, _)| *pk == k) {
                            let prev = std::mem::replace(&mut slot.1, v);
                            Ok(Some(prev))
                        } else {
                            pairs.push((k, v));
                            Ok(Some(Value::Null))
                        }
                    }
                    _ => Err("put on non-map".into()),
                }
            }
            "putAll" => {
                let src = args.next().ok_or("putAll without argument")?;
                let extra = self.map_pairs(&src)?;
                match self.obj(&receiver)? {
                    Obj::Map(pairs) => {
                        for (k, v) in extra {
                            match pairs.iter_mut().find(|(pk, _)| *pk == k) {
                                Some(slot) => slot.1 = v,
                                None => pairs.push((k, v)),
                            }
                        }
                        Ok(None)
                    }
                    _ => Err("putAll on non-map".into()),
                }
            }
            _ => Err(format!("unsupported call {}.{}", class, name)),
        }
    }

    fn materialize(&self, v: &Value, depth: usize) -> Step<Evaluated> {
        if depth > MAX_DEPTH {
            return Err("value nesting too deep".into());
        }
        Ok(match v {
            Value::Null => Evaluated::Null,
            Value::This => return Err("method returns this".into()),
            Value::Int(i) => Evaluated::Int(*i),
            Value::Str(s) => Evaluated::Str(s.clone()),
            Value::Ref(i) => match self.heap.get(*i) {
                Some(Obj::List(items)) | Some(Obj::Array(items)) => Evaluated::List(
                    items
                        .iter()
                        .map(|x| self.materialize(x, depth + 1))
                        .collect::<Step<Vec<_>>>()?,
                ),
                Some(Obj::Map(pairs)) => Evaluated::Map(
                    pairs
                        .iter()
                        .map(|(k, v)| {
                            Ok((self.materialize(k, depth + 1)?, self.materialize(v, depth + 1)?))
                        })
                        .collect::<Step<Vec<_>>>()?,
                ),
                Some(Obj::Entry(..)) => return Err("method returns a map entry".into()),
                Some(Obj::Uninit(c)) => return Err(format!("uninitialized {}", c)),
                None => return Err("dangling reference".into()),
            },
        })
    }
}

fn constant_value(cf: &ClassFile, idx: u16) -> Step<Value> {
    match cf.constant(idx).map_err(|e| e.0)? {
        Constant::String(s) => Ok(Value::Str(cf.utf8(*s).map_err(|e| e.0)?.to_string())),
        Constant::Integer(i) => Ok(Value::Int(*i as i64)),
        Constant::Long(l) => Ok(Value::Int(*l)),
        other => Err(format!("unsupported constant {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::classfile::testing::*;
    use super::super::testing::write_class;
    use super::super::ClassPathRoot;
    use super::*;

    fn eval_method(cp: &ClassPath, bytes: &[u8], name: &str, desc: &str) -> Step<Evaluated> {
        let cf = ClassFile::parse(bytes).unwrap();
        let m = cf.method(name, desc).unwrap().clone();
        evaluate(cp, &cf, &m)
    }

    fn s(v: &str) -> Evaluated {
        Evaluated::Str(v.to_string())
    }

    #[test]
    fn test_list_of_and_map_of() {
        let cp = ClassPath::default();
        let bytes = plugin_definition(
            "a.PingProcessPluginDefinition",
            V2_CONTRACT,
            "ping",
            &["bpe/ping.bpmn", "bpe/pong.bpmn"],
            &[("dsfdev_ping", vec!["fhir/a.xml", "fhir/b.xml"])],
        );
        assert_eq!(
            eval_method(&cp, &bytes, "getName", "()Ljava/lang/String;").unwrap(),
            s("ping")
        );
        assert_eq!(
            eval_method(&cp, &bytes, "getProcessModels", "()Ljava/util/List;").unwrap(),
            Evaluated::List(vec![s("bpe/ping.bpmn"), s("bpe/pong.bpmn")])
        );
        assert_eq!(
            eval_method(&cp, &bytes, "getFhirResourcesByProcessId", "()Ljava/util/Map;").unwrap(),
            Evaluated::Map(vec![(
                s("dsfdev_ping"),
                Evaluated::List(vec![s("fhir/a.xml"), s("fhir/b.xml")])
            )])
        );
    }

    #[test]
    fn test_locals_varargs_array_and_builder_map() {
        let cp = ClassPath::default();
        let mut cb = ClassBuilder::new("a.Def");
        // var a = "fhir/a.xml"; return new HashMap(){{ put("p", Arrays.asList(new String[]{a})) }}
        let code = Asm::new(&mut cb)
            .ldc("fhir/a.xml")
            .astore(1)
            .new_obj("java/util/HashMap")
            .dup()
            .invokespecial("java/util/HashMap", "<init>", "()V")
            .astore(2)
            .aload(2)
            .ldc("p")
            .iconst(1)
            .anewarray("java/lang/String")
            .dup()
            .iconst(0)
            .aload(1)
            .aastore()
            .invokestatic(
                "java/util/Arrays",
                "asList",
                "([Ljava/lang/Object;)Ljava/util/List;",
                false,
            )
            .invokeinterface(
                "java/util/Map",
                "put",
                "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
                3,
            )
            .pop()
            .aload(2)
            .areturn();
        let bytes = cb
            .method("getFhirResourcesByProcessId", "()Ljava/util/Map;", code)
            .build();
        assert_eq!(
            eval_method(&cp, &bytes, "getFhirResourcesByProcessId", "()Ljava/util/Map;").unwrap(),
            Evaluated::Map(vec![(s("p"), Evaluated::List(vec![s("fhir/a.xml")]))])
        );
    }

    #[test]
    fn test_getstatic_resolves_constants_from_other_class() {
        let dir = tempfile::tempdir().unwrap();
        let consts = ClassBuilder::new("a.Constants")
            .string_constant("NAME", "from-constants")
            .build();
        write_class(dir.path(), "a.Constants", &consts);
        let cp = ClassPath::new(vec![ClassPathRoot::Directory(dir.path().to_path_buf())]);
        let mut cb = ClassBuilder::new("a.Def");
        let code = Asm::new(&mut cb).getstatic("a/Constants", "NAME").areturn();
        let bytes = cb.method("getName", "()Ljava/lang/String;", code).build();
        assert_eq!(
            eval_method(&cp, &bytes, "getName", "()Ljava/lang/String;").unwrap(),
            s("from-constants")
        );
    }

    #[test]
    fn test_unsupported_instruction_and_call_fail() {
        let cp = ClassPath::default();
        let mut cb = ClassBuilder::new("a.Def");
        // iadd is not part of the supported subset
        let branchy = Asm::new(&mut cb).raw(0x60).areturn();
        let mut cb = cb.method("getName", "()Ljava/lang/String;", branchy);
        let call = Asm::new(&mut cb)
            .aload(0)
            .invokevirtual("a/Def", "compute", "()Ljava/util/List;")
            .areturn();
        let bytes = cb
            .method("getProcessModels", "()Ljava/util/List;", call)
            .build();
        let e1 = eval_method(&cp, &bytes, "getName", "()Ljava/lang/String;").unwrap_err();
        assert!(e1.contains("unsupported instruction"));
        let e2 = eval_method(&cp, &bytes, "getProcessModels", "()Ljava/util/List;").unwrap_err();
        assert!(e2.contains("unsupported call"));
    }

    #[test]
    fn test_null_result_materializes_as_null() {
        let cp = ClassPath::default();
        let mut cb = ClassBuilder::new("a.Def");
        let code = Asm::new(&mut cb).aconst_null().areturn();
        let bytes = cb
            .method("getProcessModels", "()Ljava/util/List;", code)
            .build();
        assert_eq!(
            eval_method(&cp, &bytes, "getProcessModels", "()Ljava/util/List;").unwrap(),
            Evaluated::Null
        );
    }
}
