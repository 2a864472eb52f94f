use bootlog::BootLogger;
use device_tree::fdt::FdtBlob;
use device_tree::tree::{cells_to_bytes, DeviceTree, EditError, PHANDLE_PROP};
use dt_fixup::{update_dt, BootConfig, Dispatcher, FixupError, FixupSet, Stage};
use log::Level;
use std::collections::HashSet;

static LOGGER: BootLogger = BootLogger::new(Level::Debug);

const BUF_SIZE: usize = 0x1000;

#[repr(C, align(8))]
pub struct AlignedBuffer<const LENGTH: usize>(pub [u8; LENGTH]);

fn init_logging() {
    // every test tries, only the first one succeeds
    let _ = LOGGER.install();
}

fn trusty_config(capacity: usize) -> BootConfig {
    BootConfig {
        fdt_max_size: capacity,
        dispatcher: Dispatcher::Trusty,
        ..BootConfig::default()
    }
}

fn add_memory(tree: &mut DeviceTree, name: &str, secure: bool) {
    let root = tree.root();
    let node = tree.add_child(root, name).unwrap();
    tree.set_property_string(node, "device_type", "memory").unwrap();
    if secure {
        tree.set_property_string(node, "status", "disabled").unwrap();
        tree.set_property_string(node, "secure-status", "okay").unwrap();
    }
}

/// A tree resembling what QEMU generates for its `virt` machine with secure memory enabled
fn platform_tree(capacity: usize, secure_memory_first: bool) -> DeviceTree {
    let mut tree = DeviceTree::new(capacity).unwrap();
    let root = tree.root();
    tree.set_property_u32(root, "#address-cells", 2).unwrap();
    tree.set_property_u32(root, "#size-cells", 2).unwrap();

    if secure_memory_first {
        add_memory(&mut tree, "memory@e000000", true);
        add_memory(&mut tree, "memory@40000000", false);
    } else {
        add_memory(&mut tree, "memory@40000000", false);
        add_memory(&mut tree, "memory@e000000", true);
    }

    let gic = tree.add_child(root, "intc@8000000").unwrap();
    tree.set_property_string(gic, "compatible", "arm,gic-v3").unwrap();
    tree.set_property_u32(gic, PHANDLE_PROP, 0x8002).unwrap();

    let timer = tree.add_child(root, "timer").unwrap();
    tree.append_property_string(timer, "compatible", "arm,armv8-timer").unwrap();
    tree.append_property_string(timer, "compatible", "arm,armv7-timer").unwrap();
    tree.set_property(
        timer,
        "interrupts",
        &cells_to_bytes(&[1, 13, 0x104, 1, 14, 0x104, 1, 11, 0x104, 1, 10, 0x104]),
    )
    .unwrap();

    let cpus = tree.add_child(root, "cpus").unwrap();
    tree.set_property_u32(cpus, "#address-cells", 1).unwrap();
    for name in ["cpu@0", "cpu@1"] {
        let cpu = tree.add_child(cpus, name).unwrap();
        tree.set_property_string(cpu, "device_type", "cpu").unwrap();
        tree.set_property_string(cpu, "compatible", "arm,cortex-a57").unwrap();
    }

    let uart = tree.add_child(root, "pl011@9000000").unwrap();
    tree.set_property_u32(uart, PHANDLE_PROP, 0x8000).unwrap();
    tree
}

fn platform_blob(secure_memory_first: bool) -> AlignedBuffer<BUF_SIZE> {
    let mut buf = AlignedBuffer([0u8; BUF_SIZE]);
    platform_tree(BUF_SIZE, secure_memory_first)
        .pack_into(&mut buf.0)
        .unwrap();
    buf
}

fn reopen(buf: &mut [u8]) -> DeviceTree {
    FdtBlob::open(buf, BUF_SIZE).unwrap().tree().clone()
}

fn total_size(buf: &[u8]) -> usize {
    u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize
}

#[test]
fn full_pipeline_on_qemu_tree() {
    init_logging();
    let mut buf = platform_blob(true);
    let len = update_dt(&mut buf.0, &trusty_config(BUF_SIZE)).unwrap();
    assert!(len <= BUF_SIZE);
    assert_eq!(total_size(&buf.0), len);

    let tree = reopen(&mut buf.0);
    assert!(tree.find_node_by_path("/memory@e000000").is_none());
    assert!(tree.find_node_by_path("/memory@40000000").is_some());

    let irq = tree.find_node_by_path("/trusty/irq").unwrap();
    let interrupts: Vec<u32> = tree.get_property(irq, "interrupts").unwrap().cells().collect();
    assert_eq!(interrupts, [1, 11, 0x104, 1, 10, 0x104]);

    let psci = tree.find_node_by_path("/psci").unwrap();
    assert_eq!(tree.get_property(psci, "method").unwrap().as_str(), Some("smc"));
    let cpu = tree.find_node_by_path("/cpus/cpu@1").unwrap();
    assert_eq!(
        tree.get_property(cpu, "enable-method").unwrap().as_str(),
        Some("psci")
    );
}

#[test]
fn spliced_interrupts_are_the_second_half() {
    init_logging();
    let mut tree = platform_tree(BUF_SIZE, true);
    let timer = tree.find_node_by_path("/timer").unwrap();
    // two 4-tuples
    tree.set_property(timer, "interrupts", &cells_to_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]))
        .unwrap();
    let mut buf = AlignedBuffer([0u8; BUF_SIZE]);
    tree.pack_into(&mut buf.0).unwrap();

    update_dt(&mut buf.0, &trusty_config(BUF_SIZE)).unwrap();
    let tree = reopen(&mut buf.0);
    let irq = tree.find_node_by_path("/trusty/irq").unwrap();
    assert_eq!(
        tree.get_property(irq, "interrupts").unwrap().value(),
        cells_to_bytes(&[5, 6, 7, 8]).as_slice()
    );
}

#[test]
fn handles_stay_unique() {
    init_logging();
    let mut buf = platform_blob(true);
    update_dt(&mut buf.0, &trusty_config(BUF_SIZE)).unwrap();

    let tree = reopen(&mut buf.0);
    let handles: Vec<u32> = tree
        .nodes()
        .filter_map(|node| tree.get_handle(node).ok())
        .map(|handle| handle.get())
        .collect();
    let unique: HashSet<u32> = handles.iter().copied().collect();
    assert_eq!(handles.len(), 3);
    assert_eq!(unique.len(), handles.len());
    assert!(unique.contains(&0x8003));
    assert!(!unique.contains(&0) && !unique.contains(&0xffff_ffff));
}

#[test]
fn lack_of_space_leaves_blob_untouched() {
    init_logging();
    let mut buf = platform_blob(true);
    let original = buf.0;
    // enough for the psci node but not for the dispatcher subtree
    let capacity = total_size(&buf.0) + 0x180;

    let failure = update_dt(&mut buf.0, &trusty_config(capacity)).unwrap_err();
    assert_eq!(failure.stage, Stage::DispatcherAnnotated);
    assert!(matches!(
        failure.error,
        FixupError::AnnotateFailed(EditError::OutOfSpace { .. })
    ));
    assert_eq!(buf.0, original);
    assert!(total_size(&buf.0) <= capacity);
}

#[test]
fn pruning_does_not_depend_on_order() {
    init_logging();
    let config = BootConfig {
        fdt_max_size: BUF_SIZE,
        fixups: FixupSet::SECURE_MEM,
        ..BootConfig::default()
    };
    let mut remaining = Vec::new();
    for secure_memory_first in [true, false] {
        let mut buf = platform_blob(secure_memory_first);
        update_dt(&mut buf.0, &config).unwrap();
        let tree = reopen(&mut buf.0);
        let mut names: Vec<String> = tree
            .nodes()
            .map(|node| tree.path(node).unwrap())
            .collect();
        names.sort();
        remaining.push(names);
    }
    assert_eq!(remaining[0], remaining[1]);
    assert!(!remaining[0].iter().any(|path| path == "/memory@e000000"));
}

#[test]
fn second_pipeline_run_changes_nothing() {
    init_logging();
    let config = trusty_config(BUF_SIZE);
    let mut buf = platform_blob(true);
    let first_len = update_dt(&mut buf.0, &config).unwrap();
    let first = buf.0;

    let second_len = update_dt(&mut buf.0, &config).unwrap();
    assert_eq!(first_len, second_len);
    assert_eq!(buf.0, first);

    let tree = reopen(&mut buf.0);
    let root = tree.root();
    let trusty_nodes = tree
        .children(root)
        .unwrap()
        .iter()
        .filter(|node| tree.name(**node).unwrap() == "trusty")
        .count();
    assert_eq!(trusty_nodes, 1);
}

#[test]
fn packing_twice_is_a_fixed_point() {
    init_logging();
    let mut buf = platform_blob(false);
    update_dt(&mut buf.0, &trusty_config(BUF_SIZE)).unwrap();
    let packed = buf.0;

    let mut blob = FdtBlob::open(&mut buf.0, BUF_SIZE).unwrap();
    blob.pack().unwrap();
    assert_eq!(buf.0, packed);
}

#[test]
fn without_dispatcher_no_routing_is_added() {
    init_logging();
    let mut buf = platform_blob(true);
    let config = BootConfig {
        fdt_max_size: BUF_SIZE,
        ..BootConfig::default()
    };
    update_dt(&mut buf.0, &config).unwrap();

    let tree = reopen(&mut buf.0);
    assert!(tree.find_node_by_path("/trusty").is_none());
    assert!(tree.find_node_by_path("/interrupt-controller").is_none());
    assert!(tree.find_node_by_path("/psci").is_some());
}

#[test]
fn disabled_fixups_keep_blob_identical() {
    init_logging();
    let config = BootConfig {
        fixups: FixupSet::empty(),
        ..trusty_config(BUF_SIZE)
    };
    let mut buf = platform_blob(true);
    let original = buf.0;
    update_dt(&mut buf.0, &config).unwrap();
    assert_eq!(buf.0, original);
}
