//! Single-pass output emission: header, compacted type directory, size
//! table, string table, converted blocks with expansions spliced in, footer.
//! Each block goes COPY -> SWAP_FIELDS -> APPEND_EXPANSIONS; blocks the
//! schema cannot walk fall back to the bulk 32-bit swap.

use std::collections::HashMap;

use wastegate_bytes::{push_i32_le, push_u16_le, push_u32_le};
use wastegate_schema::Schema;

use crate::container::ContainerView;
use crate::errors::ConvertError;
use crate::expand::havok::HavokExpansion;
use crate::expand::packed_geometry::{GeomExpansion, PackedStreams};
use crate::expand::skin_partition::SkinPartitionExpansion;
use crate::layout::Plan;
use crate::transcode::{self, WalkError};


/// Everything the scanners produced, keyed by old block index.
#[derive(Debug, Default)]
pub struct Expansions {
    /// Packed source blocks (removed from the output).
    pub packed:   HashMap<usize, PackedStreams>,
    pub geometry: HashMap<usize, GeomExpansion>,
    pub skin:     HashMap<usize, SkinPartitionExpansion>,
    pub havok:    HashMap<usize, HavokExpansion>,
}

#[derive(Debug, Default)]
pub struct EmitStats {
    /// Type names of blocks that fell back to the bulk swap.
    pub bulk_swapped: Vec<String>,
}

pub fn emit(
    input:      &[u8],
    view:       &ContainerView,
    plan:       &Plan,
    schema:     &Schema,
    expansions: &Expansions,
) -> Result<(Vec<u8>, EmitStats), ConvertError> {
    let mut out = Vec::with_capacity(plan.total_size);
    let mut stats = EmitStats::default();

    emit_header(&mut out, view, plan)?;

    for index in 0..view.blocks.len() {
        if plan.remap[index] < 0 {
            continue;
        }

        let start = out.len();
        emit_block(&mut out, input, view, plan, schema, expansions, index, &mut stats)?;

        let emitted = out.len() - start;
        if emitted != plan.new_sizes[index] as usize {
            return Err(ConvertError::Internal(format!(
                "block {index} ({}) emitted {emitted} bytes, planned {}",
                view.type_name(index),
                plan.new_sizes[index],
            )));
        }
    }

    // Footer: root refs go through the same remap as in-block refs.
    push_u32_le(&mut out, view.roots.len() as u32);
    for &root in &view.roots {
        let remapped = if root >= 0 {
            plan.remap.get(root as usize).copied().unwrap_or(-1)
        } else {
            -1
        };
        push_i32_le(&mut out, remapped);
    }

    if out.len() != plan.total_size {
        return Err(ConvertError::Internal(format!(
            "emitted {} bytes, planned {}",
            out.len(),
            plan.total_size,
        )));
    }

    Ok((out, stats))
}

fn emit_header(
    out:  &mut Vec<u8>,
    view: &ContainerView,
    plan: &Plan,
) -> Result<(), ConvertError> {
    out.extend(view.header_string.as_bytes());
    out.push(0x0A);

    push_u32_le(out, view.version);
    out.push(1); // little-endian from here on
    push_u32_le(out, view.user_version);
    push_u32_le(out, plan.num_blocks);
    out.extend(&view.bs_header_raw);

    push_u16_le(out, plan.type_names.len() as u16);
    for name in &plan.type_names {
        push_u32_le(out, name.len() as u32);
        out.extend(name.as_bytes());
    }

    for (index, block) in view.blocks.iter().enumerate() {
        if plan.remap[index] < 0 {
            continue;
        }
        let new_type = plan.type_remap.get(&block.type_index).ok_or_else(|| {
            ConvertError::Internal(format!(
                "surviving block {index} references retired type {}",
                block.type_index,
            ))
        })?;
        push_u16_le(out, *new_type);
    }

    for index in 0..view.blocks.len() {
        if plan.remap[index] < 0 {
            continue;
        }
        push_u32_le(out, plan.new_sizes[index]);
    }

    // String table reused verbatim; only the length prefixes change endian.
    push_u32_le(out, view.strings.len() as u32);
    push_u32_le(out, view.max_string_len);
    for string in &view.strings {
        push_u32_le(out, string.len() as u32);
        out.extend(string);
    }

    push_u32_le(out, view.groups.len() as u32);
    for &group in &view.groups {
        push_u32_le(out, group);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_block(
    out:        &mut Vec<u8>,
    input:      &[u8],
    view:       &ContainerView,
    plan:       &Plan,
    schema:     &Schema,
    expansions: &Expansions,
    index:      usize,
    stats:      &mut EmitStats,
) -> Result<(), ConvertError> {
    if let Some(expansion) = expansions.geometry.get(&index) {
        let packed = expansions.packed.get(&expansion.packed_block).ok_or_else(|| {
            ConvertError::Internal(format!(
                "geometry expansion for block {index} references missing packed block {}",
                expansion.packed_block,
            ))
        })?;
        expansion.emit(packed, out);
        return Ok(());
    }

    if let Some(expansion) = expansions.skin.get(&index) {
        expansion.emit(out);
        return Ok(());
    }

    if let Some(expansion) = expansions.havok.get(&index) {
        expansion.emit(out);
        return Ok(());
    }

    // Same-size conversion: copy the raw bytes, then swap in place.
    let block = &view.blocks[index];
    let start = out.len();
    let source = block
        .data_offset
        .checked_add(block.size as usize)
        .and_then(|end| input.get(block.data_offset..end))
        .ok_or_else(|| ConvertError::BlockBoundsExceeded {
            index,
            offset: block.data_offset,
            size: block.size,
            input_len: input.len(),
        })?;
    out.extend(source);

    let type_name = view.type_name(index).to_owned();

    // A block smaller than the type's unconditional fields cannot be walked;
    // don't leave it half-swapped.
    if let Some(min) = schema.min_size(&type_name) {
        if (block.size as usize) < min {
            log::warn!(
                "block {index} ({type_name}) is {} bytes, below the type's minimum {min}; \
                 bulk-swapping",
                block.size,
            );
            transcode::bulk_swap(out, start, block.size as usize);
            stats.bulk_swapped.push(type_name);
            return Ok(());
        }
    }

    let result = transcode::transcode_block(
        out,
        start,
        block.size as usize,
        &type_name,
        schema,
        view.versions(),
        &plan.remap,
    );

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            match &err {
                WalkError::UnknownBlockType(_) => {
                    log::warn!("no schema for block {index} ({type_name}); bulk-swapping");
                }
                other => {
                    log::warn!(
                        "schema walk of block {index} ({type_name}) failed ({other}); \
                         bulk-swapping"
                    );
                }
            }
            // Restore the partially-swapped copy before the lossy fallback.
            out[start..].copy_from_slice(source);
            transcode::bulk_swap(out, start, block.size as usize);
            stats.bulk_swapped.push(type_name);
            Ok(())
        }
    }
}
