//! GLSL program assembly around a user model shader.
//!
//! The composed fragment program is: fixed header (uniform block plus the
//! `fragVert`/`outputColor` interface), the user shader verbatim, then a
//! generated extractor tail that routes one component of the model function's
//! output to the framebuffer.

/// `pos` construction when slicing along X.
pub const VEC3_X: &str = "u_slice, fragVert.yz";
/// `pos` construction when slicing along Y.
pub const VEC3_Y: &str = "fragVert.x, u_slice, fragVert.z";
/// `pos` construction when slicing along Z.
pub const VEC3_Z: &str = "fragVert.xy, u_slice";

const UNIFORM_BLOCK: &str = r#"layout(std140, binding = 0) uniform Uniforms {
    mat4 projection;
    mat4 camera;
    mat4 model;
    float u_slice;
    int u_materialNum;
};"#;

/// The fixed vertex program: transforms the slicing quad and passes the
/// world-space position through as `fragVert`.
pub fn vertex_source() -> String {
    format!(
        r#"#version 450

{UNIFORM_BLOCK}

layout(location = 0) in vec3 vert;
layout(location = 0) out vec3 fragVert;

void main() {{
    gl_Position = projection * camera * model * vec4(vert, 1.0);
    fragVert = vert;
}}
"#
    )
}

/// The composed fragment program for a model with `num_materials` materials,
/// slicing with the given `pos` construction (one of [`VEC3_X`], [`VEC3_Y`],
/// [`VEC3_Z`]).
pub fn fragment_source(user_shader: &str, num_materials: usize, vec3_str: &str) -> String {
    format!(
        r#"#version 450

{UNIFORM_BLOCK}

layout(location = 0) in vec3 fragVert;
layout(location = 0) out vec4 outputColor;

{user_shader}

{}"#,
        extractor_tail(num_materials, vec3_str)
    )
}

/// The generated `main` that calls the model function appropriate for the
/// material count and selects the `u_materialNum` (1-based) component.
fn extractor_tail(num_materials: usize, vec3_str: &str) -> String {
    let (decl, call) = if num_materials <= 4 {
        ("vec4 m;", format!("mainModel4(m, vec3({vec3_str}));"))
    } else if num_materials <= 9 {
        ("mat3 m;", format!("mainModel9(m, vec3({vec3_str}));"))
    } else {
        ("mat4 m;", format!("mainModel16(m, vec3({vec3_str}));"))
    };

    let mut cases = String::new();
    if num_materials <= 4 {
        for (i, comp) in ["m.x", "m.y", "m.z", "m.w"].iter().enumerate() {
            cases.push_str(&format!("    case {}: d = {}; break;\n", i + 1, comp));
        }
    } else {
        let dim = if num_materials <= 9 { 3 } else { 4 };
        for col in 0..dim {
            for row in 0..dim {
                let num = col * dim + row + 1;
                cases.push_str(&format!(
                    "    case {}: d = m[{}][{}]; break;\n",
                    num, col, row
                ));
            }
        }
    }

    format!(
        r#"void main() {{
    {decl}
    {call}
    float d = 0.0;
    switch (u_materialNum) {{
{cases}    }}
    outputColor = vec4(d);
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_by_material_count() {
        for (count, want) in [
            (1, "mainModel4"),
            (4, "mainModel4"),
            (5, "mainModel9"),
            (9, "mainModel9"),
            (10, "mainModel16"),
            (16, "mainModel16"),
        ] {
            let src = fragment_source("// user shader", count, VEC3_Z);
            assert!(src.contains(want), "count={count} missing {want}");
        }
    }

    #[test]
    fn test_case_counts() {
        let tail = extractor_tail(4, VEC3_Z);
        assert_eq!(tail.matches("case ").count(), 4);
        assert!(tail.contains("case 4: d = m.w; break;"));

        let tail = extractor_tail(9, VEC3_Z);
        assert_eq!(tail.matches("case ").count(), 9);
        assert!(tail.contains("case 9: d = m[2][2]; break;"));

        let tail = extractor_tail(16, VEC3_Z);
        assert_eq!(tail.matches("case ").count(), 16);
        assert!(tail.contains("case 16: d = m[3][3]; break;"));
    }

    #[test]
    fn test_pos_construction() {
        assert!(extractor_tail(1, VEC3_X).contains("vec3(u_slice, fragVert.yz)"));
        assert!(extractor_tail(1, VEC3_Y).contains("vec3(fragVert.x, u_slice, fragVert.z)"));
        assert!(extractor_tail(1, VEC3_Z).contains("vec3(fragVert.xy, u_slice)"));
    }

    #[test]
    fn test_user_shader_between_header_and_tail() {
        let src = fragment_source("void mainModel4(out vec4 m, in vec3 p) {}", 1, VEC3_Z);
        let user = src.find("void mainModel4").unwrap();
        assert!(src.find("uniform Uniforms").unwrap() < user);
        assert!(user < src.find("void main()").unwrap());
        assert!(src.contains("outputColor = vec4(d);"));
    }
}
