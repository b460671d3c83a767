//! Binary serialization of parse results.
//!
//! The blob starts with the magic `LPR\x01`. Integers are base-128
//! little-endian varints; strings are varint length-prefixed UTF-8. Field
//! order per design unit is fixed, so output bytes are deterministic for
//! identical input. Positions carry line and column only; the filename is
//! redundant inside the cache; diagnostics keep theirs.

use loom_core::{Error, ErrorCode, Result};
use loom_lang::{
    AlwaysBlock, AlwaysKind, Assignment, CaseKind, CaseStatement, DesignUnit,
    DesignUnitKind, Diagnostic, GenerateBlock, ImportDecl, Instantiation, LabeledBlock,
    ParamDecl, ParseResult, PortDecl, PortDir, SignalDecl, SourcePos,
};

const MAGIC: &[u8; 4] = b"LPR\x01";

fn truncated(what: &str) -> Error {
    Error::new(ErrorCode::Io, format!("corrupted cache: truncated {what}"))
}

// ---- writers ----

fn write_varint(buf: &mut Vec<u8>, mut val: u64) {
    while val >= 0x80 {
        buf.push((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    buf.push(val as u8);
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn write_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

fn write_pos(buf: &mut Vec<u8>, pos: SourcePos) {
    write_varint(buf, u64::from(pos.line));
    write_varint(buf, u64::from(pos.col));
}

// ---- readers ----

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self, what: &str) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| truncated(what))?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self, what: &str) -> Result<u64> {
        let mut val: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.byte(what)?;
            val |= u64::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return Ok(val);
            }
            shift += 7;
            if shift >= 64 {
                return Err(truncated(what));
            }
        }
    }

    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.varint(what)? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| truncated(what))?;
        let s = std::str::from_utf8(&self.data[self.pos..end])
            .map_err(|_| truncated(what))?
            .to_string();
        self.pos = end;
        Ok(s)
    }

    fn boolean(&mut self, what: &str) -> Result<bool> {
        Ok(self.byte(what)? != 0)
    }

    fn position(&mut self, what: &str) -> Result<SourcePos> {
        let line = u32::try_from(self.varint(what)?).map_err(|_| truncated(what))?;
        let col = u32::try_from(self.varint(what)?).map_err(|_| truncated(what))?;
        Ok(SourcePos::new(line, col))
    }
}

// ---- enum tags ----

fn unit_kind_tag(kind: DesignUnitKind) -> u8 {
    match kind {
        DesignUnitKind::Module => 0,
        DesignUnitKind::Package => 1,
        DesignUnitKind::Interface => 2,
        DesignUnitKind::Class => 3,
        DesignUnitKind::Program => 4,
    }
}

fn unit_kind_from(tag: u8) -> Result<DesignUnitKind> {
    Ok(match tag {
        0 => DesignUnitKind::Module,
        1 => DesignUnitKind::Package,
        2 => DesignUnitKind::Interface,
        3 => DesignUnitKind::Class,
        4 => DesignUnitKind::Program,
        _ => return Err(truncated("unit kind")),
    })
}

fn port_dir_tag(dir: PortDir) -> u8 {
    match dir {
        PortDir::Input => 0,
        PortDir::Output => 1,
        PortDir::Inout => 2,
        PortDir::Ref => 3,
    }
}

fn port_dir_from(tag: u8) -> Result<PortDir> {
    Ok(match tag {
        0 => PortDir::Input,
        1 => PortDir::Output,
        2 => PortDir::Inout,
        3 => PortDir::Ref,
        _ => return Err(truncated("port direction")),
    })
}

fn always_kind_tag(kind: AlwaysKind) -> u8 {
    match kind {
        AlwaysKind::Plain => 0,
        AlwaysKind::Star => 1,
        AlwaysKind::Comb => 2,
        AlwaysKind::Ff => 3,
        AlwaysKind::Latch => 4,
    }
}

fn always_kind_from(tag: u8) -> Result<AlwaysKind> {
    Ok(match tag {
        0 => AlwaysKind::Plain,
        1 => AlwaysKind::Star,
        2 => AlwaysKind::Comb,
        3 => AlwaysKind::Ff,
        4 => AlwaysKind::Latch,
        _ => return Err(truncated("always kind")),
    })
}

fn case_kind_tag(kind: CaseKind) -> u8 {
    match kind {
        CaseKind::Case => 0,
        CaseKind::Casex => 1,
        CaseKind::Casez => 2,
    }
}

fn case_kind_from(tag: u8) -> Result<CaseKind> {
    Ok(match tag {
        0 => CaseKind::Case,
        1 => CaseKind::Casex,
        2 => CaseKind::Casez,
        _ => return Err(truncated("case kind")),
    })
}

// ---- serialize ----

/// Serialize a parse result into the cache blob format.
#[must_use]
pub fn serialize_parse_result(result: &ParseResult) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1024);
    buf.extend_from_slice(MAGIC);

    write_varint(&mut buf, result.units.len() as u64);
    for unit in &result.units {
        buf.push(unit_kind_tag(unit.kind));
        write_string(&mut buf, &unit.name);
        write_varint(&mut buf, u64::from(unit.start_line));
        write_varint(&mut buf, u64::from(unit.end_line));
        write_varint(&mut buf, u64::from(unit.depth));
        write_bool(&mut buf, unit.has_defparam);

        write_varint(&mut buf, unit.ports.len() as u64);
        for p in &unit.ports {
            write_string(&mut buf, &p.name);
            buf.push(port_dir_tag(p.direction));
            write_string(&mut buf, &p.type_text);
            write_pos(&mut buf, p.pos);
        }

        write_varint(&mut buf, unit.params.len() as u64);
        for p in &unit.params {
            write_string(&mut buf, &p.name);
            write_string(&mut buf, &p.default_text);
            write_bool(&mut buf, p.is_localparam);
            write_pos(&mut buf, p.pos);
        }

        write_varint(&mut buf, unit.instantiations.len() as u64);
        for i in &unit.instantiations {
            write_string(&mut buf, &i.module_name);
            write_string(&mut buf, &i.instance_name);
            write_bool(&mut buf, i.is_parameterized);
            write_pos(&mut buf, i.pos);
        }

        write_varint(&mut buf, unit.imports.len() as u64);
        for imp in &unit.imports {
            write_string(&mut buf, &imp.package_name);
            write_string(&mut buf, &imp.symbol);
            write_bool(&mut buf, imp.is_wildcard);
            write_pos(&mut buf, imp.pos);
        }

        write_varint(&mut buf, unit.always_blocks.len() as u64);
        for ab in &unit.always_blocks {
            buf.push(always_kind_tag(ab.kind));
            write_string(&mut buf, &ab.label);
            write_varint(&mut buf, ab.assignments.len() as u64);
            for a in &ab.assignments {
                write_bool(&mut buf, a.is_blocking);
                write_string(&mut buf, &a.target);
                write_pos(&mut buf, a.pos);
            }
            write_pos(&mut buf, ab.pos);
        }

        write_varint(&mut buf, unit.case_statements.len() as u64);
        for cs in &unit.case_statements {
            buf.push(case_kind_tag(cs.kind));
            write_bool(&mut buf, cs.has_default);
            write_bool(&mut buf, cs.is_unique);
            write_bool(&mut buf, cs.is_priority);
            write_pos(&mut buf, cs.pos);
        }

        write_varint(&mut buf, unit.signals.len() as u64);
        for s in &unit.signals {
            write_string(&mut buf, &s.name);
            write_string(&mut buf, &s.type_text);
            write_pos(&mut buf, s.pos);
        }

        write_varint(&mut buf, unit.generate_blocks.len() as u64);
        for g in &unit.generate_blocks {
            write_string(&mut buf, &g.label);
            write_bool(&mut buf, g.has_label);
            write_pos(&mut buf, g.pos);
        }

        write_varint(&mut buf, unit.labeled_blocks.len() as u64);
        for lb in &unit.labeled_blocks {
            write_string(&mut buf, &lb.begin_label);
            write_string(&mut buf, &lb.end_label);
            write_bool(&mut buf, lb.labels_match);
            write_pos(&mut buf, lb.pos);
        }

        write_pos(&mut buf, unit.pos);
    }

    write_varint(&mut buf, result.diagnostics.len() as u64);
    for d in &result.diagnostics {
        write_string(&mut buf, &d.message);
        write_string(&mut buf, &d.file);
        write_varint(&mut buf, u64::from(d.line));
        write_varint(&mut buf, u64::from(d.col));
    }

    buf
}

// ---- deserialize ----

/// Deserialize a cache blob back into a parse result.
///
/// # Errors
///
/// Returns a `Checksum` error for wrong magic bytes and an `Io` error for
/// any truncation or invalid tag.
pub fn deserialize_parse_result(data: &[u8]) -> Result<ParseResult> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(Error::new(ErrorCode::Checksum, "invalid cache magic bytes"));
    }

    let mut r = Reader {
        data,
        pos: MAGIC.len(),
    };
    let mut result = ParseResult::default();

    let num_units = r.varint("unit count")?;
    result.units.reserve(num_units as usize);
    for _ in 0..num_units {
        let kind = unit_kind_from(r.byte("unit kind")?)?;
        let name = r.string("unit name")?;
        let start_line = u32::try_from(r.varint("start line")?)
            .map_err(|_| truncated("start line"))?;
        let end_line =
            u32::try_from(r.varint("end line")?).map_err(|_| truncated("end line"))?;
        let depth = u32::try_from(r.varint("depth")?).map_err(|_| truncated("depth"))?;
        let has_defparam = r.boolean("defparam flag")?;

        let mut unit = DesignUnit::new(kind, name, depth, SourcePos::default());
        unit.start_line = start_line;
        unit.end_line = end_line;
        unit.has_defparam = has_defparam;

        for _ in 0..r.varint("port count")? {
            unit.ports.push(PortDecl {
                name: r.string("port name")?,
                direction: port_dir_from(r.byte("port direction")?)?,
                type_text: r.string("port type")?,
                pos: r.position("port position")?,
            });
        }

        for _ in 0..r.varint("param count")? {
            unit.params.push(ParamDecl {
                name: r.string("param name")?,
                default_text: r.string("param default")?,
                is_localparam: r.boolean("localparam flag")?,
                pos: r.position("param position")?,
            });
        }

        for _ in 0..r.varint("instantiation count")? {
            unit.instantiations.push(Instantiation {
                module_name: r.string("instantiation module")?,
                instance_name: r.string("instantiation name")?,
                is_parameterized: r.boolean("parameterized flag")?,
                pos: r.position("instantiation position")?,
            });
        }

        for _ in 0..r.varint("import count")? {
            unit.imports.push(ImportDecl {
                package_name: r.string("import package")?,
                symbol: r.string("import symbol")?,
                is_wildcard: r.boolean("wildcard flag")?,
                pos: r.position("import position")?,
            });
        }

        for _ in 0..r.varint("always count")? {
            let kind = always_kind_from(r.byte("always kind")?)?;
            let label = r.string("always label")?;
            let mut assignments = Vec::new();
            for _ in 0..r.varint("assignment count")? {
                assignments.push(Assignment {
                    is_blocking: r.boolean("blocking flag")?,
                    target: r.string("assignment target")?,
                    pos: r.position("assignment position")?,
                });
            }
            unit.always_blocks.push(AlwaysBlock {
                kind,
                label,
                assignments,
                pos: r.position("always position")?,
            });
        }

        for _ in 0..r.varint("case count")? {
            unit.case_statements.push(CaseStatement {
                kind: case_kind_from(r.byte("case kind")?)?,
                has_default: r.boolean("default flag")?,
                is_unique: r.boolean("unique flag")?,
                is_priority: r.boolean("priority flag")?,
                pos: r.position("case position")?,
            });
        }

        for _ in 0..r.varint("signal count")? {
            unit.signals.push(SignalDecl {
                name: r.string("signal name")?,
                type_text: r.string("signal type")?,
                pos: r.position("signal position")?,
            });
        }

        for _ in 0..r.varint("generate count")? {
            unit.generate_blocks.push(GenerateBlock {
                label: r.string("generate label")?,
                has_label: r.boolean("generate label flag")?,
                pos: r.position("generate position")?,
            });
        }

        for _ in 0..r.varint("labeled count")? {
            unit.labeled_blocks.push(LabeledBlock {
                begin_label: r.string("begin label")?,
                end_label: r.string("end label")?,
                labels_match: r.boolean("labels match flag")?,
                pos: r.position("labeled position")?,
            });
        }

        unit.pos = r.position("unit position")?;
        result.units.push(unit);
    }

    for _ in 0..r.varint("diagnostic count")? {
        result.diagnostics.push(Diagnostic {
            message: r.string("diagnostic message")?,
            file: r.string("diagnostic file")?,
            line: u32::try_from(r.varint("diagnostic line")?)
                .map_err(|_| truncated("diagnostic line"))?,
            col: u32::try_from(r.varint("diagnostic column")?)
                .map_err(|_| truncated("diagnostic column"))?,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_lang::parse_source;

    fn sample() -> ParseResult {
        parse_source(
            "module counter #(parameter WIDTH = 8) (
                input  logic clk,
                input  logic rst,
                output logic [7:0] count
            );
                import util_pkg::*;
                wire overflow;
                always_ff @(posedge clk) begin
                    if (rst) count <= '0;
                    else count <= count + 1;
                end
                always_comb begin
                    case (count)
                        8'hFF: overflow_next = 1;
                        default: overflow_next = 0;
                    endcase
                end
                sub_block u_sub (.clk(clk));
            endmodule",
            "counter.sv",
        )
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let original = sample();
        assert!(!original.units.is_empty());

        let blob = serialize_parse_result(&original);
        let restored = deserialize_parse_result(&blob).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn roundtrip_empty_result() {
        let original = ParseResult::default();
        let blob = serialize_parse_result(&original);
        assert_eq!(deserialize_parse_result(&blob).unwrap(), original);
    }

    #[test]
    fn roundtrip_with_diagnostics() {
        let original = parse_source("module ;\nendmodule", "bad.sv");
        assert!(!original.diagnostics.is_empty());

        let blob = serialize_parse_result(&original);
        let restored = deserialize_parse_result(&blob).unwrap();
        assert_eq!(restored.diagnostics, original.diagnostics);
        assert_eq!(restored.diagnostics[0].file, "bad.sv");
    }

    #[test]
    fn serialization_is_deterministic() {
        let result = sample();
        assert_eq!(
            serialize_parse_result(&result),
            serialize_parse_result(&result)
        );
    }

    #[test]
    fn wrong_magic_is_checksum_error() {
        let err = deserialize_parse_result(b"XYZ\x01rest").unwrap_err();
        assert_eq!(err.code, ErrorCode::Checksum);
    }

    #[test]
    fn empty_input_is_checksum_error() {
        let err = deserialize_parse_result(b"").unwrap_err();
        assert_eq!(err.code, ErrorCode::Checksum);
    }

    #[test]
    fn truncation_is_io_error() {
        let blob = serialize_parse_result(&sample());
        for cut in [5, blob.len() / 2, blob.len() - 1] {
            let err = deserialize_parse_result(&blob[..cut]).unwrap_err();
            assert_eq!(err.code, ErrorCode::Io, "cut at {cut}");
        }
    }

    #[test]
    fn garbage_after_magic_is_io_error() {
        let mut blob = b"LPR\x01".to_vec();
        blob.extend_from_slice(&[0xFF; 4]);
        // An absurd unit count runs the reader off the end.
        let err = deserialize_parse_result(&blob).unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
