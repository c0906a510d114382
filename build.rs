//! Writes `memory.x` for the linker. With the `bootloaded` feature the
//! application starts after the two 16 KiB sectors holding the DFU bootloader.
//! The `.magic` word sits at the start of CCM RAM so the bootloader and every
//! application agree on its address.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

const FLASH_ORIGIN: u32 = 0x0800_0000;
const FLASH_LENGTH: u32 = 1024 * 1024;
const BOOTLOADER_LENGTH: u32 = 0x8000;

fn main() {
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let offset = if env::var_os("CARGO_FEATURE_BOOTLOADED").is_some() {
        BOOTLOADER_LENGTH
    } else {
        0
    };

    let mut memory = File::create(out.join("memory.x")).unwrap();
    writeln!(
        memory,
        "MEMORY
{{
  FLASH : ORIGIN = {:#010X}, LENGTH = {}K
  RAM   : ORIGIN = 0x20000000, LENGTH = 128K
  CCMRAM : ORIGIN = 0x10000000, LENGTH = 64K
}}

SECTIONS
{{
  .magic (NOLOAD) : ALIGN(4)
  {{
    KEEP(*(.magic));
  }} > CCMRAM
}}
INSERT AFTER .uninit;",
        FLASH_ORIGIN + offset,
        (FLASH_LENGTH - offset) / 1024
    )
    .unwrap();

    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");
}
