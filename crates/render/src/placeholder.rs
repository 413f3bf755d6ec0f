use crate::device::{
    AddressMode, FilterMode, RenderDevice, SamplerDesc, SamplerId, TextureDesc, TextureDimension,
    TextureFormat, TextureId,
};
use crate::error::DeviceError;
use std::collections::BTreeMap;

/// Stand-in content for an unbound optional texture slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    White,
    /// Tangent-space `(0, 0, 1)`.
    FlatNormal,
    Black,
}

impl Placeholder {
    pub fn texel(self) -> [u8; 4] {
        match self {
            Self::White => [255, 255, 255, 255],
            Self::FlatNormal => [128, 128, 255, 255],
            Self::Black => [0, 0, 0, 255],
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::White => "placeholder.white",
            Self::FlatNormal => "placeholder.flat_normal",
            Self::Black => "placeholder.black",
        }
    }
}

/// Lazily created 1x1 placeholder textures plus the one sampler shared by
/// every texture slot.
#[derive(Debug, Default)]
pub struct PlaceholderTextures {
    textures: BTreeMap<(Placeholder, TextureDimension), TextureId>,
    sampler: Option<SamplerId>,
}

impl PlaceholderTextures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        placeholder: Placeholder,
        dimension: TextureDimension,
    ) -> Result<TextureId, DeviceError> {
        if let Some(&id) = self.textures.get(&(placeholder, dimension)) {
            return Ok(id);
        }
        let desc = TextureDesc::sampled(placeholder.label(), 1, 1, dimension, TextureFormat::Rgba8Unorm);
        let data = placeholder.texel().repeat(dimension.layers() as usize);
        let id = device.create_texture(&desc, Some(&data))?;
        tracing::debug!(?placeholder, ?dimension, "created placeholder texture");
        self.textures.insert((placeholder, dimension), id);
        Ok(id)
    }

    pub fn sampler<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<SamplerId, DeviceError> {
        if let Some(id) = self.sampler {
            return Ok(id);
        }
        let id = device.create_sampler(&SamplerDesc {
            label: "sampler.linear".into(),
            filter: FilterMode::Linear,
            address: AddressMode::Repeat,
        })?;
        self.sampler = Some(id);
        Ok(id)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn destroy<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, id) in std::mem::take(&mut self.textures) {
            device.destroy_texture(id);
        }
        if let Some(sampler) = self.sampler.take() {
            device.destroy_sampler(sampler);
        }
    }
}
