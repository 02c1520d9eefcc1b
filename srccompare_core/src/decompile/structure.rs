use super::DecompileBackend;
use std::io;

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Reads the class-file format directly and lists the class, its fields and
/// its methods.
///
/// Output is a stable, sorted listing:
///
/// ```text
/// CLASS com/example/Foo
/// FIELD count I
/// METHOD <init>()V
/// METHOD run(Ljava/lang/String;)Z
/// ```
///
/// It carries no method bodies, so it only detects signature-level changes,
/// but needs nothing outside the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassStructureBackend;

impl DecompileBackend for ClassStructureBackend {
    fn decompile(&self, _entry_name: &str, bytes: &[u8]) -> io::Result<String> {
        let class = parse_class(bytes)?;

        let mut members: Vec<String> = class
            .fields
            .iter()
            .map(|(name, descriptor)| format!("FIELD {} {}", name, descriptor))
            .chain(
                class
                    .methods
                    .iter()
                    .map(|(name, descriptor)| format!("METHOD {}{}", name, descriptor)),
            )
            .collect();
        members.sort();

        let mut out = format!("CLASS {}\n", class.name);
        for member in members {
            out.push_str(&member);
            out.push('\n');
        }
        Ok(out)
    }
}

struct ClassStructure {
    name: String,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String)>,
}

#[derive(Clone)]
enum Constant {
    Unused,
    Utf8(String),
    Class(u16),
    Other,
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| invalid(format!("truncated class file at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> io::Result<()> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> io::Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> io::Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn parse_class(bytes: &[u8]) -> io::Result<ClassStructure> {
    let mut cursor = ByteCursor::new(bytes);

    let magic = cursor.u32()?;
    if magic != CLASS_MAGIC {
        return Err(invalid(format!("bad class magic {:#010x}", magic)));
    }
    cursor.skip(4)?; // minor, major

    let pool = read_constant_pool(&mut cursor)?;

    cursor.skip(2)?; // access flags
    let this_class = cursor.u16()?;
    let name = class_name(&pool, this_class)?.to_string();
    cursor.skip(2)?; // super class

    let interfaces = cursor.u16()? as usize;
    cursor.skip(interfaces * 2)?;

    let fields = read_members(&mut cursor, &pool)?;
    let methods = read_members(&mut cursor, &pool)?;

    Ok(ClassStructure {
        name,
        fields,
        methods,
    })
}

fn read_constant_pool(cursor: &mut ByteCursor<'_>) -> io::Result<Vec<Constant>> {
    let count = cursor.u16()? as usize;
    let mut pool = vec![Constant::Unused; count.max(1)];

    let mut index = 1;
    while index < count {
        let tag = cursor.u8()?;
        let mut width = 1;
        pool[index] = match tag {
            1 => {
                let len = cursor.u16()? as usize;
                Constant::Utf8(String::from_utf8_lossy(cursor.take(len)?).into_owned())
            }
            7 => Constant::Class(cursor.u16()?),
            3 | 4 => {
                cursor.skip(4)?;
                Constant::Other
            }
            // Long and Double occupy two pool slots
            5 | 6 => {
                cursor.skip(8)?;
                width = 2;
                Constant::Other
            }
            8 | 16 | 19 | 20 => {
                cursor.skip(2)?;
                Constant::Other
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                cursor.skip(4)?;
                Constant::Other
            }
            15 => {
                cursor.skip(3)?;
                Constant::Other
            }
            other => {
                return Err(invalid(format!(
                    "unknown constant pool tag {} at index {}",
                    other, index
                )))
            }
        };
        index += width;
    }

    Ok(pool)
}

fn utf8(pool: &[Constant], index: u16) -> io::Result<&str> {
    match pool.get(index as usize) {
        Some(Constant::Utf8(value)) => Ok(value),
        _ => Err(invalid(format!("constant {} is not a UTF-8 entry", index))),
    }
}

fn class_name(pool: &[Constant], index: u16) -> io::Result<&str> {
    match pool.get(index as usize) {
        Some(Constant::Class(name_index)) => utf8(pool, *name_index),
        _ => Err(invalid(format!("constant {} is not a class entry", index))),
    }
}

fn read_members(
    cursor: &mut ByteCursor<'_>,
    pool: &[Constant],
) -> io::Result<Vec<(String, String)>> {
    let count = cursor.u16()? as usize;
    let mut members = Vec::with_capacity(count);

    for _ in 0..count {
        cursor.skip(2)?; // access flags
        let name = utf8(pool, cursor.u16()?)?.to_string();
        let descriptor = utf8(pool, cursor.u16()?)?.to_string();

        let attributes = cursor.u16()?;
        for _ in 0..attributes {
            cursor.skip(2)?;
            let len = cursor.u32()? as usize;
            cursor.skip(len)?;
        }

        members.push((name, descriptor));
    }

    Ok(members)
}

/// Minimal class-file writer for tests
#[cfg(test)]
pub(crate) fn class_bytes(name: &str, fields: &[(&str, &str)], methods: &[(&str, &str)]) -> Vec<u8> {
    struct PoolBuilder {
        entries: Vec<u8>,
        next: u16,
    }

    impl PoolBuilder {
        fn utf8(&mut self, value: &str) -> u16 {
            self.entries.push(1);
            self.entries
                .extend_from_slice(&(value.len() as u16).to_be_bytes());
            self.entries.extend_from_slice(value.as_bytes());
            self.bump(1)
        }

        fn class(&mut self, name: &str) -> u16 {
            let name_index = self.utf8(name);
            self.entries.push(7);
            self.entries.extend_from_slice(&name_index.to_be_bytes());
            self.bump(1)
        }

        fn long(&mut self, value: i64) -> u16 {
            self.entries.push(5);
            self.entries.extend_from_slice(&value.to_be_bytes());
            self.bump(2)
        }

        fn bump(&mut self, width: u16) -> u16 {
            let index = self.next;
            self.next += width;
            index
        }
    }

    let mut pool = PoolBuilder {
        entries: Vec::new(),
        next: 1,
    };
    let this_class = pool.class(name);
    let super_class = pool.class("java/lang/Object");
    pool.long(42);
    let code = pool.utf8("Code");

    let mut members = Vec::new();
    for group in [fields, methods] {
        members.extend_from_slice(&(group.len() as u16).to_be_bytes());
        for (member_name, descriptor) in group {
            let name_index = pool.utf8(member_name);
            let descriptor_index = pool.utf8(descriptor);
            members.extend_from_slice(&0x0001u16.to_be_bytes());
            members.extend_from_slice(&name_index.to_be_bytes());
            members.extend_from_slice(&descriptor_index.to_be_bytes());
            // One opaque attribute per member
            members.extend_from_slice(&1u16.to_be_bytes());
            members.extend_from_slice(&code.to_be_bytes());
            members.extend_from_slice(&3u32.to_be_bytes());
            members.extend_from_slice(&[0xB1, 0x00, 0x00]);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&52u16.to_be_bytes());
    out.extend_from_slice(&pool.next.to_be_bytes());
    out.extend_from_slice(&pool.entries);
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&this_class.to_be_bytes());
    out.extend_from_slice(&super_class.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
    out.extend_from_slice(&members);
    out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
    out
}
