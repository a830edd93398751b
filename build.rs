// Build script to compile the UI shaders (GLSL) to SPIR-V
//
// The binary loads ./shader/ui.vert.spv and ./shader/ui.frag.spv at runtime,
// so the output lands next to the sources.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shader/ui.vert");
    println!("cargo:rerun-if-changed=shader/ui.frag");

    // Compile shaders using glslc (part of Vulkan SDK)
    compile_shader("shader/ui.vert", "shader/ui.vert.spv");
    compile_shader("shader/ui.frag", "shader/ui.frag.spv");
}

fn compile_shader(input: &str, output: &str) {
    let result = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
