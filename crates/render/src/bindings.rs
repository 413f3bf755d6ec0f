use crate::device::{BindGroupDesc, BindGroupId, BindingKind, BindingResource, BufferId, PipelineId, RenderDevice};
use crate::error::RenderError;
use crate::material::{Material, SlotRequirement, TextureSlot};
use crate::placeholder::PlaceholderTextures;

/// Binding shapes of the groups a material's pipeline expects.
///
/// Group 0 is the uniform buffer followed by a `(texture, sampler)` pair per
/// primary slot; group 1 exists only when secondary slots are declared.
pub(crate) fn group_layouts(primary: &[TextureSlot], secondary: &[TextureSlot]) -> Vec<Vec<BindingKind>> {
    let mut group0 = vec![BindingKind::UniformBuffer];
    group0.extend(slot_kinds(primary));
    let mut groups = vec![group0];
    if !secondary.is_empty() {
        groups.push(slot_kinds(secondary).collect());
    }
    groups
}

fn slot_kinds(slots: &[TextureSlot]) -> impl Iterator<Item = BindingKind> + '_ {
    slots
        .iter()
        .flat_map(|slot| [BindingKind::Texture(slot.dimension), BindingKind::Sampler])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoundGroups {
    pub primary: BindGroupId,
    pub secondary: Option<BindGroupId>,
}

impl BoundGroups {
    pub fn release<D: RenderDevice + ?Sized>(self, device: &mut D) {
        device.release_bind_group(self.primary);
        if let Some(secondary) = self.secondary {
            device.release_bind_group(secondary);
        }
    }
}

/// Everything needed to build the bind groups of one draw.
pub(crate) struct BindingRequest<'a> {
    pub label: &'a str,
    pub pipeline: PipelineId,
    pub uniform_buffer: BufferId,
    pub primary_slots: &'a [TextureSlot],
    pub secondary_slots: &'a [TextureSlot],
}

/// Build bind groups from the material's current textures.
///
/// Empty optional slots get placeholders. An empty required slot fails with
/// [`RenderError::MissingTexture`] and leaves nothing allocated.
pub(crate) fn build_bind_groups<D: RenderDevice + ?Sized>(
    device: &mut D,
    placeholders: &mut PlaceholderTextures,
    material: &dyn Material,
    request: &BindingRequest<'_>,
) -> Result<BoundGroups, RenderError> {
    let mut resources = vec![BindingResource::Buffer(request.uniform_buffer)];
    resolve_slots(device, placeholders, material, request.primary_slots, &mut resources)?;
    let primary = device.create_bind_group(&BindGroupDesc {
        label: format!("{}.group0", request.label),
        pipeline: request.pipeline,
        group: 0,
        resources,
    })?;

    if request.secondary_slots.is_empty() {
        return Ok(BoundGroups {
            primary,
            secondary: None,
        });
    }

    let mut resources = Vec::with_capacity(request.secondary_slots.len() * 2);
    let secondary = resolve_slots(device, placeholders, material, request.secondary_slots, &mut resources)
        .and_then(|()| {
            device
                .create_bind_group(&BindGroupDesc {
                    label: format!("{}.group1", request.label),
                    pipeline: request.pipeline,
                    group: 1,
                    resources,
                })
                .map_err(RenderError::from)
        });
    match secondary {
        Ok(secondary) => Ok(BoundGroups {
            primary,
            secondary: Some(secondary),
        }),
        Err(err) => {
            device.release_bind_group(primary);
            Err(err)
        }
    }
}

fn resolve_slots<D: RenderDevice + ?Sized>(
    device: &mut D,
    placeholders: &mut PlaceholderTextures,
    material: &dyn Material,
    slots: &[TextureSlot],
    out: &mut Vec<BindingResource>,
) -> Result<(), RenderError> {
    for slot in slots {
        let texture = match (material.texture(slot.name), slot.requirement) {
            (Some(texture), _) => texture,
            (None, SlotRequirement::Required) => {
                return Err(RenderError::MissingTexture {
                    material: material.material_type().to_string(),
                    slot: slot.name.to_string(),
                });
            }
            (None, SlotRequirement::Optional) => {
                tracing::trace!(
                    material = material.material_type(),
                    slot = slot.name,
                    placeholder = ?slot.placeholder,
                    "binding placeholder for empty optional slot"
                );
                placeholders.texture(device, slot.placeholder, slot.dimension)?
            }
        };
        out.push(BindingResource::Texture(texture));
        out.push(BindingResource::Sampler(placeholders.sampler(device)?));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureDimension;
    use crate::placeholder::Placeholder;

    #[test]
    fn layouts_pair_textures_with_samplers() {
        let primary = [TextureSlot::optional("map", TextureDimension::D2, Placeholder::White)];
        let secondary = [TextureSlot::required("env", TextureDimension::Cube)];
        let groups = group_layouts(&primary, &secondary);
        assert_eq!(
            groups,
            vec![
                vec![
                    BindingKind::UniformBuffer,
                    BindingKind::Texture(TextureDimension::D2),
                    BindingKind::Sampler,
                ],
                vec![BindingKind::Texture(TextureDimension::Cube), BindingKind::Sampler],
            ]
        );
    }

    #[test]
    fn no_secondary_group_without_slots() {
        assert_eq!(group_layouts(&[], &[]).len(), 1);
    }
}
