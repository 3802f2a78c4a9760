//! Canonical type signatures.
//!
//! A signature is a string determined only by the shape of a type. It is the
//! key under which the registry deduplicates nominal definitions, so two types
//! get the same signature exactly when they are structurally identical. Every
//! composite form opens with its own keyword and closes with `End`, and names
//! are length-prefixed, which keeps the encoding prefix-free when types nest.

use ir::{StreamDirection, Type};
use std::fmt::Write;

/// Payload spelling for alternatives that carry nothing.
pub const UNIT_PAYLOAD: &str = "unit";

pub fn signature(ty: &Type) -> String {
    let mut out = String::new();
    write_signature(&mut out, ty);
    out
}

fn write_signature(out: &mut String, ty: &Type) {
    match ty {
        Type::Primitive(p) => out.push_str(p.name()),
        Type::Record(fields) => {
            out.push_str("Struct");
            for field in fields {
                write_name(out, &field.name);
                write_signature(out, &field.ty);
            }
            out.push_str("End");
        }
        Type::Variant(alts) => {
            out.push_str("Enum");
            for alt in alts {
                write_name(out, &alt.name);
                if alt.ty.is_unit() {
                    out.push_str(UNIT_PAYLOAD);
                } else {
                    write_signature(out, &alt.ty);
                }
            }
            out.push_str("End");
        }
        Type::Tuple(elems) => {
            out.push_str("Tuple");
            for elem in elems {
                out.push('T');
                write_signature(out, elem);
            }
            out.push_str("End");
        }
        Type::Array { element, rank } => {
            out.push_str("Tensor");
            write_signature(out, element);
            // Writing into a String never fails.
            let _ = write!(out, "x{}", rank);
            out.push_str("End");
        }
        Type::Stream { item, direction } => {
            out.push_str(match direction {
                StreamDirection::In => "Pullable",
                StreamDirection::Out => "PushableStream",
                StreamDirection::Bidirectional => "Stream",
            });
            write_signature(out, item);
            out.push_str("End");
        }
        Type::Function { inputs, output } => {
            out.push_str("Fn");
            for input in inputs {
                out.push('A');
                write_signature(out, input);
            }
            out.push('R');
            if let Some(output) = output {
                write_signature(out, output);
            }
            out.push_str("End");
        }
    }
}

fn write_name(out: &mut String, name: &str) {
    let _ = write!(out, "{}{}", name.len(), name);
}
