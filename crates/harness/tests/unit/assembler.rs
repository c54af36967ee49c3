//! # Boot Image Assembly Tests
//!
//! Each target writes its memory map into a freshly reset directory and
//! seals it only after every image was produced.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use rvconform_core::HarnessError;
use rvconform_core::common::{GuestAddr, LayoutError};
use rvconform_core::image::assembler::IMAGE_SET_MARKER;
use rvconform_core::image::{BootImageAssembler, BootTarget, ImageRole, ImageSet, TestSuite};

use crate::common::elf::ElfBuilder;
use crate::common::mocks::MockDeviceTree;

fn zephyr_sample(base: &Path, name: &str) {
    ElfBuilder::new()
        .entry(0x1000)
        .text("vector", 0x1000, &[0x6f; 0x40])
        .text("text", 0x8000_0000, &[0x13; 0x200])
        .data("datas", 0x8000_0400, &[0x55; 0x20])
        .bss("bss", 0x8000_0800, 0x100)
        .write_to(
            &base
                .join("samples")
                .join(name)
                .join("outdir/qemu_riscv32/zephyr.strip"),
        );
}

#[test]
fn bare_metal_writes_one_image_per_test() {
    let dir = tempfile::tempdir().unwrap();
    let in_dir = dir.path().join("riscv-tests");
    for name in ["rv64ui-p-add", "rv64ui-p-sub"] {
        ElfBuilder::new()
            .text(".text.init", 0x8000_0000, &[0x93; 0x100])
            .data(".tohost", 0x8000_1000, &[0; 0x10])
            .write_to(&in_dir.join("isa").join(name));
    }
    let out = dir.path().join("out");

    let set = BootImageAssembler::new(&out)
        .assemble(&BootTarget::BareMetal {
            in_dir,
            suite: TestSuite::Isa,
            tests: vec!["rv64ui-p-add".to_string(), "rv64ui-p-sub".to_string()],
        })
        .unwrap();

    assert_eq!(set.entries.len(), 2);
    for entry in &set.entries {
        assert_eq!(entry.role, ImageRole::Program);
        assert_eq!(entry.load_address, Some(GuestAddr(0x8000_0000)));
        assert_eq!(entry.path, out.join(format!("{}.bin", entry.name)));
        assert_eq!(fs::metadata(&entry.path).unwrap().len(), 0x8000);
    }
    assert!(out.join(IMAGE_SET_MARKER).is_file());
}

#[test]
fn rtos_split_produces_rom_and_ram_images() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("zephyr");
    zephyr_sample(&base, "philosophers");
    let out = dir.path().join("work/zephyr");

    let set = BootImageAssembler::new(&out)
        .assemble(&BootTarget::RtosSplit {
            zephyr_base: base,
            samples: vec!["philosophers".to_string()],
        })
        .unwrap();

    let ram = set.get(ImageRole::Ram).unwrap();
    let rom = set.get(ImageRole::Rom).unwrap();
    assert_eq!(ram.path, out.join("philosophers.ram.bin"));
    assert_eq!(rom.path, out.join("philosophers.rom.bin"));
    assert_eq!(ram.load_address, Some(GuestAddr(0x8000_0000)));
    assert_eq!(rom.load_address, Some(GuestAddr(0x1000)));

    let rom_bytes = fs::read(&rom.path).unwrap();
    assert_eq!(rom_bytes.len(), 0x1000);
    assert!(rom_bytes[..0x40].iter().all(|&b| b == 0x6f));
    assert!(rom_bytes[0x40..].iter().all(|&b| b == 0));

    let ram_bytes = fs::read(&ram.path).unwrap();
    assert_eq!(ram_bytes.len(), 0x8000);
    assert!(ram_bytes[..0x200].iter().all(|&b| b == 0x13));
    assert!(ram_bytes[0x400..0x420].iter().all(|&b| b == 0x55));
    assert!(ram_bytes[0x800..].iter().all(|&b| b == 0));
    assert!(!ram_bytes.contains(&0x6f));
}

#[test]
fn linux_assembles_bootloader_kernel_initramfs_and_dtb() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = dir.path().join("sdk");
    ElfBuilder::new()
        .text(".text", 0x8000_0000, &[0x17; 0x400])
        .write_to(&sdk.join("work/riscv-pk/bbl"));
    ElfBuilder::new()
        .text(".head.text", 0xffff_ffe0_0000_0000, &[0x29; 0x100])
        .write_to(&sdk.join("work/linux/vmlinux"));
    fs::write(sdk.join("work/initramfs.cpio.gz"), b"\x1f\x8b initramfs").unwrap();
    let out = dir.path().join("work/linux");

    let mut dtb = MockDeviceTree::new();
    dtb.expect_generate()
        .times(1)
        .returning(|bios, kernel, initrd, out_path| {
            assert!(bios.ends_with("work/riscv-pk/bbl"));
            assert!(kernel.ends_with("work/linux/vmlinux"));
            assert!(initrd.ends_with("work/initramfs.cpio.gz"));
            fs::write(out_path, b"\xd0\x0d\xfe\xed").unwrap();
            Ok(())
        });

    let set = BootImageAssembler::new(&out)
        .with_device_tree_source(Box::new(dtb))
        .assemble(&BootTarget::Linux { sdk_dir: sdk })
        .unwrap();

    let roles: Vec<ImageRole> = set.entries.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![
            ImageRole::Bootloader,
            ImageRole::DeviceTreeBlob,
            ImageRole::Kernel,
            ImageRole::Initramfs
        ]
    );

    let bbl = set.get(ImageRole::Bootloader).unwrap();
    assert_eq!(fs::metadata(&bbl.path).unwrap().len(), 0x20_0000);

    let kernel = set.get(ImageRole::Kernel).unwrap();
    assert_eq!(kernel.load_address, Some(GuestAddr(0x8020_0000)));
    let kernel_bytes = fs::read(&kernel.path).unwrap();
    assert_eq!(kernel_bytes.len(), 0x1d0_0000);
    assert!(kernel_bytes[..0x100].iter().all(|&b| b == 0x29));

    let initramfs = set.get(ImageRole::Initramfs).unwrap();
    assert_eq!(initramfs.load_address, Some(GuestAddr(0x8400_0000)));
    assert_eq!(fs::read(&initramfs.path).unwrap(), b"\x1f\x8b initramfs");

    let blob = set.get(ImageRole::DeviceTreeBlob).unwrap();
    assert_eq!(blob.path, out.join("rafi-emu.dtb"));
    assert_eq!(blob.load_address, None);

    assert_eq!(ImageSet::open_verified(&out).unwrap(), set);
}

#[test]
fn linux_without_device_tree_source_is_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BootImageAssembler::new(dir.path().join("out"))
        .assemble(&BootTarget::Linux {
            sdk_dir: dir.path().to_path_buf(),
        })
        .unwrap_err();
    assert!(matches!(err, HarnessError::Setup(_)));
}

#[test]
fn output_directory_is_reset_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("zephyr");
    zephyr_sample(&base, "synchronization");
    let out = dir.path().join("out");
    fs::create_dir_all(out.join("nested")).unwrap();
    fs::write(out.join("stale.bin"), b"old").unwrap();
    fs::write(out.join("nested/stale.bin"), b"old").unwrap();

    let _ = BootImageAssembler::new(&out)
        .assemble(&BootTarget::RtosSplit {
            zephyr_base: base,
            samples: vec!["synchronization".to_string()],
        })
        .unwrap();

    let mut names: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            IMAGE_SET_MARKER.to_string(),
            "synchronization.ram.bin".to_string(),
            "synchronization.rom.bin".to_string()
        ]
    );
}

#[test]
fn failed_assembly_leaves_directory_unsealed() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("zephyr");
    zephyr_sample(&base, "philosophers");
    let out = dir.path().join("out");

    let err = BootImageAssembler::new(&out)
        .assemble(&BootTarget::RtosSplit {
            zephyr_base: base,
            samples: vec!["philosophers".to_string(), "missing".to_string()],
        })
        .unwrap_err();

    assert!(matches!(err, HarnessError::Layout(LayoutError::SourceNotFound(_))));
    assert!(out.join("philosophers.ram.bin").is_file());
    assert!(!out.join(IMAGE_SET_MARKER).exists());
    assert!(matches!(
        ImageSet::open_verified(&out),
        Err(HarnessError::IncompleteImageSet(_))
    ));
}

#[test]
fn open_verified_rejects_missing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("zephyr");
    zephyr_sample(&base, "philosophers");
    let out = dir.path().join("out");
    let set = BootImageAssembler::new(&out)
        .assemble(&BootTarget::RtosSplit {
            zephyr_base: base,
            samples: vec!["philosophers".to_string()],
        })
        .unwrap();

    assert_eq!(ImageSet::open_verified(&out).unwrap(), set);
    fs::remove_file(&set.get(ImageRole::Rom).unwrap().path).unwrap();
    assert!(matches!(
        ImageSet::open_verified(&out),
        Err(HarnessError::IncompleteImageSet(_))
    ));
}
