//! Tool argument templates for one embedded target.
//!
//! The compile, link, and convert command lines are fixed vectors
//! parameterized only by the source and object names. They live in a value
//! rather than being inlined at the call sites so an alternative target stays
//! expressible without touching the coordinator.

use std::path::Path;

/// Argument templates and naming conventions for the target toolchain.
#[derive(Debug, Clone)]
pub struct Toolchain {
    compiler: String,
    linker: String,
    objcopy: String,
    working_dir: String,
    source_extension: String,
    image_name: String,
    artifact_name: String,
    pch_name: String,
    shared_header: String,
    compile_flags: Vec<String>,
    link_inputs_pre: Vec<String>,
    link_inputs_post: Vec<String>,
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Prefix the absolute path in one template element with `root`, leaving
/// flags, relative names, and `=`-joined options alone.
fn reroot(arg: &mut String, root: &str) {
    for flag in ["-I", "-L"] {
        if let Some(path) = arg.strip_prefix(flag) {
            if path.starts_with('/') {
                *arg = format!("{flag}{root}{path}");
            }
            return;
        }
    }
    if arg.starts_with('/') {
        *arg = format!("{root}{arg}");
    }
}

impl Toolchain {
    /// The micro:bit v2 (nRF52833, Cortex-M4) target this worker ships with.
    #[must_use]
    pub fn microbit_v2() -> Self {
        Self {
            compiler: "clang++".to_string(),
            linker: "ld.lld".to_string(),
            objcopy: "llvm-objcopy".to_string(),
            working_dir: "/working".to_string(),
            source_extension: ".cpp".to_string(),
            image_name: "MICROBIT".to_string(),
            artifact_name: "MICROBIT.hex".to_string(),
            pch_name: "MicroBit.h.pch".to_string(),
            shared_header: "/libraries/codal-microbit-v2/model/MicroBit.h".to_string(),
            compile_flags: strings(&[
                "--target=arm-none-eabi",
                "-DMICROBIT_EXPORTS",
                "-I/include",
                "-I/libraries/codal-core/inc",
                "-I/libraries/codal-microbit-v2/inc",
                "-Wno-expansion-to-defined",
                "-mcpu=cortex-m4",
                "-mthumb",
                "-mfpu=fpv4-sp-d16",
                "-mfloat-abi=softfp",
                "-fno-exceptions",
                "-fno-unwind-tables",
                "-ffunction-sections",
                "-fdata-sections",
                "-Wall",
                "-Wextra",
                "-Wno-unused-parameter",
                "-std=c++11",
                "-fwrapv",
                "-fno-rtti",
                "-fno-threadsafe-statics",
                "-O2",
                "-g",
                "-DNDEBUG",
                "-DNRF52833_XXAA",
                "-DTARGET_MCU_NRF52833",
                "-D__CORTEX_M4",
                "-D__START=target_start",
            ]),
            link_inputs_pre: strings(&[
                "-X",
                "/libraries/arm-none-eabi/thumb/v7e-m+fp/softfp/crti.o",
                "/libraries/arm-none-eabi/thumb/v7e-m+fp/softfp/crtbegin.o",
                "/libraries/arm-none-eabi-newlib/thumb/v7e-m+fp/softfp/crt0.o",
                "-L/libraries/arm-none-eabi/thumb/v7e-m+fp/softfp",
                "-L/libraries/arm-none-eabi-newlib/thumb/v7e-m+fp/softfp",
                "--gc-sections",
                "--sort-common",
                "--sort-section=alignment",
                "--wrap",
                "atexit",
                "--start-group",
            ]),
            link_inputs_post: strings(&[
                "/libs/libcodal-microbit-v2.a",
                "/libs/libcodal-core.a",
                "/libs/libcodal-nrf52.a",
                "/libs/libcodal-microbit-nrf5sdk.a",
                "/libraries/codal-microbit-v2/lib/bootloader.o",
                "/libraries/codal-microbit-v2/lib/mbr.o",
                "/libraries/codal-microbit-v2/lib/settings.o",
                "/libraries/codal-microbit-v2/lib/softdevice.o",
                "/libraries/codal-microbit-v2/lib/uicr.o",
                "-lstdc++_nano",
                "-lsupc++_nano",
                "-lm",
                "-lnosys",
                "-lc_nano",
                "-lgcc",
                "--end-group",
                "/libraries/arm-none-eabi/thumb/v7e-m+fp/softfp/crtend.o",
                "/libraries/arm-none-eabi/thumb/v7e-m+fp/softfp/crtn.o",
                "-T",
                "/libraries/codal-microbit-v2/ld/nrf52833-softdevice.ld",
            ]),
        }
    }

    /// Re-anchor the fixed absolute paths (includes, libraries, linker
    /// script, shared header) under a host directory, for toolchains whose
    /// files live on a real disk rather than a virtual root. The working
    /// directory stays virtual; the filesystem maps it to its host
    /// counterpart.
    #[must_use]
    pub fn rooted_at(mut self, host_root: &Path) -> Self {
        let root = host_root.display().to_string();
        let root = root.trim_end_matches('/');
        for arg in self
            .compile_flags
            .iter_mut()
            .chain(self.link_inputs_pre.iter_mut())
            .chain(self.link_inputs_post.iter_mut())
        {
            reroot(arg, root);
        }
        reroot(&mut self.shared_header, root);
        self
    }

    /// Whether a request entry is a compilation unit (vs an auxiliary input).
    #[must_use]
    pub fn is_source(&self, name: &str) -> bool {
        name.ends_with(&self.source_extension)
    }

    /// Object file name convention: the source name with `.obj` appended.
    #[must_use]
    pub fn object_name(&self, source: &str) -> String {
        format!("{source}.obj")
    }

    #[must_use]
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Absolute virtual path of a file in the working directory.
    #[must_use]
    pub fn working_path(&self, name: &str) -> String {
        format!("{}/{name}", self.working_dir)
    }

    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    #[must_use]
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    #[must_use]
    pub fn pch_name(&self) -> &str {
        &self.pch_name
    }

    /// Compile one source to its object file. `pch_ready` injects the shared
    /// precompiled header produced during startup.
    #[must_use]
    pub fn compile_argv(&self, source: &str, pch_ready: bool) -> Vec<String> {
        let mut argv = vec![self.compiler.clone()];
        if pch_ready {
            argv.push("-include-pch".to_string());
            argv.push(self.pch_name.clone());
        }
        argv.extend(self.compile_flags.iter().cloned());
        argv.push("-o".to_string());
        argv.push(self.object_name(source));
        argv.push("-c".to_string());
        argv.push(source.to_string());
        argv
    }

    /// Link the object list with the fixed runtime inputs into the image.
    #[must_use]
    pub fn link_argv(&self, objects: &[String]) -> Vec<String> {
        let mut argv = vec![self.linker.clone(), "-o".to_string(), self.image_name.clone()];
        argv.extend(self.link_inputs_pre.iter().cloned());
        argv.extend(objects.iter().cloned());
        argv.extend(self.link_inputs_post.iter().cloned());
        argv
    }

    /// Convert the linked image to the flashable ihex artifact.
    #[must_use]
    pub fn convert_argv(&self) -> Vec<String> {
        vec![
            self.objcopy.clone(),
            "-O".to_string(),
            "ihex".to_string(),
            self.image_name.clone(),
            self.artifact_name.clone(),
        ]
    }

    /// Precompile the shared header used by every compilation unit.
    #[must_use]
    pub fn pch_argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.compiler.clone(),
            "-x".to_string(),
            "c++-header".to_string(),
            "-Xclang".to_string(),
            "-emit-pch".to_string(),
        ];
        argv.extend(self.compile_flags.iter().cloned());
        argv.push("-o".to_string());
        argv.push(self.pch_name.clone());
        argv.push("-c".to_string());
        argv.push(self.shared_header.clone());
        argv
    }

    /// A cheap invocation proving the compiler can run at all.
    #[must_use]
    pub fn probe_argv(&self) -> Vec<String> {
        vec![self.compiler.clone(), "--version".to_string()]
    }
}
