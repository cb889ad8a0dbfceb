//! Output layout planning: which blocks survive, their new indices and
//! sizes, the compacted block-type-name table, and the total output size.

use std::collections::HashMap;

use crate::container::ContainerView;
use crate::errors::ConvertError;


#[derive(Debug, Clone)]
pub struct Plan {
    /// Old block index -> new block index, or -1 for removed blocks.
    pub remap: Vec<i32>,
    /// New size per old block index (meaningless for removed blocks).
    pub new_sizes: Vec<u32>,
    /// Type names still referenced by surviving blocks, in original order.
    pub type_names: Vec<String>,
    /// Old type index -> index into `type_names`.
    pub type_remap: HashMap<u16, u16>,
    pub num_blocks: u32,
    /// Expected length of the emitted file.
    pub total_size: usize,
}

impl Plan {
    /// Build the remap and size plan. `removed` lists block indices dropped
    /// from the output; `size_overrides` carries the expanders' new sizes.
    pub fn build(
        view:           &ContainerView,
        removed:        &[usize],
        size_overrides: &HashMap<usize, u32>,
    ) -> Result<Self, ConvertError> {
        let block_count = view.blocks.len();

        for &index in removed {
            if index >= block_count {
                return Err(ConvertError::Internal(format!(
                    "removal of nonexistent block {index}"
                )));
            }
        }
        for (&index, _) in size_overrides {
            if index >= block_count || removed.contains(&index) {
                return Err(ConvertError::Internal(format!(
                    "size override for invalid block {index}"
                )));
            }
        }

        let mut remap = Vec::with_capacity(block_count);
        let mut next = 0i32;
        for index in 0..block_count {
            if removed.contains(&index) {
                remap.push(-1);
            } else {
                remap.push(next);
                next += 1;
            }
        }
        let num_blocks = next as u32;

        let mut new_sizes = Vec::with_capacity(block_count);
        for (index, block) in view.blocks.iter().enumerate() {
            new_sizes.push(size_overrides.get(&index).copied().unwrap_or(block.size));
        }

        // Compact the type-name table down to the types surviving blocks
        // still reference, preserving the original order.
        let mut used = vec![false; view.block_type_names.len()];
        for (index, block) in view.blocks.iter().enumerate() {
            if remap[index] >= 0 {
                if let Some(slot) = used.get_mut(usize::from(block.type_index)) {
                    *slot = true;
                }
            }
        }

        let mut type_names = Vec::new();
        let mut type_remap = HashMap::new();
        for (old_index, name) in view.block_type_names.iter().enumerate() {
            if used[old_index] {
                type_remap.insert(old_index as u16, type_names.len() as u16);
                type_names.push(name.clone());
            }
        }

        let total_size = header_size(view, &remap, &new_sizes, &type_names)
            + footer_size(view);

        Ok(Self {
            remap,
            new_sizes,
            type_names,
            type_remap,
            num_blocks,
            total_size,
        })
    }
}

fn header_size(
    view:       &ContainerView,
    remap:      &[i32],
    new_sizes:  &[u32],
    type_names: &[String],
) -> usize {
    let survivors = remap.iter().filter(|&&new| new >= 0).count();

    let mut size = view.header_string.len() + 1; // magic line + newline
    size += 4 + 1 + 4 + 4; // version, endian byte, user version, num blocks
    size += view.bs_header_raw.len();

    size += 2; // num block types
    size += type_names.iter().map(|name| 4 + name.len()).sum::<usize>();
    size += survivors * 2; // type indices
    size += survivors * 4; // block sizes

    size += 4 + 4; // num strings, max string length
    size += view.strings.iter().map(|s| 4 + s.len()).sum::<usize>();
    size += 4 + view.groups.len() * 4;

    size += remap
        .iter()
        .zip(new_sizes)
        .filter(|&(&new, _)| new >= 0)
        .map(|(_, &size)| size as usize)
        .sum::<usize>();

    size
}

fn footer_size(view: &ContainerView) -> usize {
    4 + view.roots.len() * 4
}
