// Device memory allocation
//
// No sub-allocation: every resource gets its own VkDeviceMemory block.

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::vk;
use super::DeviceContext;

/// Lowest memory type index whose bit is set in `type_bits` and whose
/// property flags are a superset of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_bits & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        has_type && has_properties
    })
}

/// Allocate a block from the first compatible memory type. No fallback.
pub fn allocate(
    ctx: &DeviceContext,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
    size: vk::DeviceSize,
) -> RenderResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(&ctx.memory_properties, type_bits, properties)
        .ok_or(RenderError::NoMatchingMemoryType { type_bits, properties })?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(size)
        .memory_type_index(memory_type_index);

    unsafe { ctx.device.allocate_memory(&alloc_info, None) }.vk_context("vkAllocateMemory")
}

/// Map the whole block, copy `data` to its start, unmap.
///
/// Host-visible memory only. There is no offset write.
pub fn upload(device: &ash::Device, memory: vk::DeviceMemory, data: &[u8]) -> RenderResult<()> {
    unsafe {
        let ptr = device
            .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            .vk_context("vkMapMemory")? as *mut u8;

        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        device.unmap_memory(memory);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;

    #[test]
    fn picks_lowest_matching_index() {
        let props = properties(&[
            DEVICE_LOCAL,
            HOST_VISIBLE | HOST_COHERENT,
            HOST_VISIBLE | HOST_COHERENT | DEVICE_LOCAL,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, HOST_VISIBLE), Some(1));
        assert_eq!(find_memory_type(&props, 0b111, DEVICE_LOCAL), Some(0));
        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::empty()), Some(0));
    }

    #[test]
    fn respects_type_bits() {
        let props = properties(&[HOST_VISIBLE, HOST_VISIBLE, HOST_VISIBLE | DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&props, 0b100, HOST_VISIBLE), Some(2));
        assert_eq!(find_memory_type(&props, 0b110, HOST_VISIBLE), Some(1));
    }

    #[test]
    fn requires_property_superset() {
        let props = properties(&[HOST_VISIBLE, DEVICE_LOCAL, HOST_VISIBLE | HOST_COHERENT]);
        assert_eq!(find_memory_type(&props, 0b111, HOST_VISIBLE | HOST_COHERENT), Some(2));
    }

    #[test]
    fn no_match_is_none() {
        let props = properties(&[DEVICE_LOCAL, HOST_VISIBLE]);
        // right properties, wrong bit
        assert_eq!(find_memory_type(&props, 0b01, HOST_VISIBLE), None);
        // bits beyond memory_type_count are ignored
        assert_eq!(find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::empty()), None);
        assert_eq!(find_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()), None);
    }

    #[test]
    fn exhaustive_small_tables() {
        // brute-force against a straightforward reference scan
        let flag_set = [DEVICE_LOCAL, HOST_VISIBLE, HOST_VISIBLE | HOST_COHERENT];
        let table = properties(&[
            flag_set[2],
            flag_set[0],
            flag_set[1],
            flag_set[0] | flag_set[2],
        ]);
        for type_bits in 0u32..16 {
            for &wanted in &flag_set {
                let expected = (0..4u32).find(|&i| {
                    type_bits & (1 << i) != 0
                        && table.memory_types[i as usize].property_flags & wanted == wanted
                });
                assert_eq!(find_memory_type(&table, type_bits, wanted), expected);
            }
        }
    }
}
