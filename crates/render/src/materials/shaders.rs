/// Unlit color, optionally modulated by a texture. Used for solid and
/// wireframe draws alike.
pub const BASIC_SHADER: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var color_map: texture_2d<f32>;
@group(0) @binding(2)
var color_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.mvp * vec4<f32>(vertex.position, 1.0);
    out.uv = vertex.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(color_map, color_sampler, in.uv) * uniforms.color;
}
"#;

/// World-space normals mapped to RGB.
pub const NORMAL_SHADER: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
};

fn normal_to_color(n: vec3<f32>) -> vec3<f32> {
    return n * 0.5 + vec3<f32>(0.5);
}

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.mvp * vec4<f32>(vertex.position, 1.0);
    out.world_normal = (uniforms.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(normal_to_color(normalize(in.world_normal)), uniforms.params.x);
}
"#;

/// Lit surface with color and normal maps, up to four lights and an
/// optional environment reflection.
pub const STANDARD_SHADER: &str = r#"
struct Light {
    position_or_direction: vec4<f32>,
    color: vec4<f32>,
    params: vec4<f32>,
};

struct Uniforms {
    mvp: mat4x4<f32>,
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
    emissive: vec4<f32>,
    camera_position: vec4<f32>,
    // roughness, metallic, env intensity, has env map
    params: vec4<f32>,
    ambient: vec4<f32>,
    light_count: vec4<u32>,
    lights: array<Light, 4>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var color_map: texture_2d<f32>;
@group(0) @binding(2)
var color_sampler: sampler;
@group(0) @binding(3)
var normal_map: texture_2d<f32>;
@group(0) @binding(4)
var normal_sampler: sampler;
@group(1) @binding(0)
var env_map: texture_cube<f32>;
@group(1) @binding(1)
var env_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) world_tangent: vec4<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.mvp * vec4<f32>(vertex.position, 1.0);
    out.world_position = (uniforms.model * vec4<f32>(vertex.position, 1.0)).xyz;
    out.world_normal = (uniforms.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.uv = vertex.uv;
    out.world_tangent = vec4<f32>((uniforms.model * vec4<f32>(vertex.tangent.xyz, 0.0)).xyz, vertex.tangent.w);
    return out;
}

fn perturb_normal(n: vec3<f32>, t: vec4<f32>, ts_normal: vec3<f32>) -> vec3<f32> {
    if (length(t.xyz) < 1e-4) {
        return n;
    }
    let tangent = normalize(t.xyz - n * dot(n, t.xyz));
    let bitangent = cross(n, tangent) * select(1.0, -1.0, t.w < 0.0);
    return normalize(mat3x3<f32>(tangent, bitangent, n) * ts_normal);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(color_map, color_sampler, in.uv) * uniforms.base_color;
    let ts_normal = textureSample(normal_map, normal_sampler, in.uv).xyz * 2.0 - vec3<f32>(1.0);
    let n = perturb_normal(normalize(in.world_normal), in.world_tangent, ts_normal);
    let v = normalize(uniforms.camera_position.xyz - in.world_position);

    let roughness = clamp(uniforms.params.x, 0.04, 1.0);
    let metallic = clamp(uniforms.params.y, 0.0, 1.0);
    let shininess = 2.0 / (roughness * roughness);
    let specular_color = mix(vec3<f32>(0.04), albedo.rgb, metallic);
    let diffuse_color = albedo.rgb * (1.0 - metallic);

    var color = uniforms.ambient.rgb * albedo.rgb + uniforms.emissive.rgb;
    let count = min(uniforms.light_count.x, 4u);
    for (var i = 0u; i < count; i += 1u) {
        let light = uniforms.lights[i];
        var l = normalize(-light.position_or_direction.xyz);
        var attenuation = 1.0;
        if (light.position_or_direction.w > 0.5) {
            let to_light = light.position_or_direction.xyz - in.world_position;
            let dist = length(to_light);
            l = to_light / max(dist, 1e-4);
            attenuation = clamp(1.0 - dist / max(light.params.x, 1e-4), 0.0, 1.0);
        }
        let radiance = light.color.rgb * light.color.a * attenuation;
        let h = normalize(l + v);
        let n_dot_l = max(dot(n, l), 0.0);
        let spec = pow(max(dot(n, h), 0.0), shininess);
        color += (diffuse_color * n_dot_l + specular_color * spec * n_dot_l) * radiance;
    }

    let env = textureSample(env_map, env_sampler, reflect(-v, n)).rgb;
    color += env * specular_color * uniforms.params.z * uniforms.params.w;
    return vec4<f32>(color, albedo.a);
}
"#;

/// Full-screen triangle sampling a cube map along the view direction.
pub const SKYBOX_SHADER: &str = r#"
struct Uniforms {
    inverse_view_projection: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
@group(0) @binding(1)
var env_map: texture_cube<f32>;
@group(0) @binding(2)
var env_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = uv * 2.0 - vec2<f32>(1.0);
    var out: VertexOutput;
    out.clip_position = vec4<f32>(ndc, 1.0, 1.0);
    out.ndc = ndc;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let world = uniforms.inverse_view_projection * vec4<f32>(in.ndc, 1.0, 1.0);
    let dir = normalize(world.xyz / world.w);
    return vec4<f32>(textureSample(env_map, env_sampler, dir).rgb * uniforms.params.x, 1.0);
}
"#;
