//! Address spaces on top of the coremap allocator and simulated RAM, with
//! user loads and stores driven through the software TLB and the fault handler
//! the way the hardware would.

use kernel_alloc::phys_mapper::SimulatedRam;
use kernel_alloc::{FrameAllocator, vm_bootstrap};
use kernel_info::memory::{STACK_PAGES, USERSTACK};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::SoftInterrupts;
use kernel_vmem::{
    AddressSpace, AddressSpaceError, CurrentProcess, Errno, FaultError, Mmu, RegionPermissions,
    SoftTlb,
};

type Space<'a, 'm> = AddressSpace<'a, FrameAllocator<'m>, SimulatedRam>;

struct Process<'a, 'm> {
    space: Option<Space<'a, 'm>>,
}

impl<'a, 'm: 'a> CurrentProcess<'a> for Process<'a, 'm> {
    type Alloc = FrameAllocator<'m>;
    type Mapper = SimulatedRam;

    fn address_space(&self) -> Option<&Space<'a, 'm>> {
        self.space.as_ref()
    }
}

type Cpu = Mmu<SoftTlb, SoftInterrupts>;

const TEXT: u32 = 0x0040_0000;
const DATA: u32 = 0x1000_0000;

fn cpu() -> Cpu {
    Mmu::new(SoftTlb::new(), SoftInterrupts::new())
}

fn switch(cpu: &mut Cpu) {
    cpu.deactivate();
    cpu.activate();
}

fn store(
    cpu: &mut Cpu,
    proc: &Process<'_, '_>,
    ram: &SimulatedRam,
    va: u32,
    byte: u8,
) -> Result<(), FaultError> {
    let va = VirtualAddress::new(va);
    loop {
        match cpu.tlb().translate(va, true) {
            Ok(pa) => {
                ram.write_u8(pa, byte);
                return Ok(());
            }
            Err(kind) => cpu.vm_fault(Some(proc), kind, va)?,
        }
    }
}

fn load(
    cpu: &mut Cpu,
    proc: &Process<'_, '_>,
    ram: &SimulatedRam,
    va: u32,
) -> Result<u8, FaultError> {
    let va = VirtualAddress::new(va);
    loop {
        match cpu.tlb().translate(va, false) {
            Ok(pa) => return Ok(ram.read_u8(pa)),
            Err(kind) => cpu.vm_fault(Some(proc), kind, va)?,
        }
    }
}

fn program<'a, 'm>(alloc: &'a FrameAllocator<'m>, ram: &'a SimulatedRam) -> Space<'a, 'm> {
    let mut space = AddressSpace::new(alloc, ram);
    let text = RegionPermissions::new().with_readable(true).with_executable(true);
    let data = RegionPermissions::new().with_readable(true).with_writeable(true);
    space.define_region(VirtualAddress::new(TEXT), 0x1800, text).unwrap();
    space.define_region(VirtualAddress::new(DATA), 0x1000, data).unwrap();
    space.prepare_load().unwrap();
    space
}

#[test]
fn loader_writes_text_then_it_freezes() {
    let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 65);
    let alloc = FrameAllocator::new(ram.ram_range());
    vm_bootstrap(&alloc, &ram).unwrap();
    let mut cpu = cpu();

    let mut proc = Process { space: Some(program(&alloc, &ram)) };
    store(&mut cpu, &proc, &ram, TEXT + 0x10, 0x42).unwrap();
    store(&mut cpu, &proc, &ram, TEXT + 0x1010, 0x43).unwrap();

    proc.space.as_mut().unwrap().complete_load(&mut cpu);
    assert_eq!(cpu.tlb().valid_count(), 0);

    assert_eq!(load(&mut cpu, &proc, &ram, TEXT + 0x10), Ok(0x42));
    let err = store(&mut cpu, &proc, &ram, TEXT + 0x10, 0).unwrap_err();
    assert_eq!(
        err,
        FaultError::ReadOnly {
            address: VirtualAddress::new(TEXT + 0x10)
        }
    );
    assert_eq!(err.errno(), Errno::Fault);
    assert_eq!(load(&mut cpu, &proc, &ram, TEXT + 0x10), Ok(0x42));

    // data and stack stay writable
    store(&mut cpu, &proc, &ram, DATA + 4, 7).unwrap();
    store(&mut cpu, &proc, &ram, USERSTACK - 1, 9).unwrap();
    assert_eq!(load(&mut cpu, &proc, &ram, USERSTACK - 1), Ok(9));
}

#[test]
fn unmapped_addresses_fault() {
    let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 65);
    let alloc = FrameAllocator::new(ram.ram_range());
    vm_bootstrap(&alloc, &ram).unwrap();
    let mut cpu = cpu();
    let proc = Process { space: Some(program(&alloc, &ram)) };

    let gap = DATA + 0x0100_0000;
    assert_eq!(
        load(&mut cpu, &proc, &ram, gap),
        Err(FaultError::Segmentation {
            address: VirtualAddress::new(gap)
        })
    );
    assert_eq!(cpu.tlb().valid_count(), 0);

    let orphan = Process { space: None };
    assert_eq!(load(&mut cpu, &orphan, &ram, TEXT), Err(FaultError::NoAddressSpace));
}

#[test]
fn fork_copies_are_isolated() {
    let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 65);
    let alloc = FrameAllocator::new(ram.ram_range());
    vm_bootstrap(&alloc, &ram).unwrap();
    let mut cpu = cpu();

    let parent = Process { space: Some(program(&alloc, &ram)) };
    store(&mut cpu, &parent, &ram, TEXT + 0x123, 0xA1).unwrap();
    store(&mut cpu, &parent, &ram, DATA + 0xFFF, 0xB2).unwrap();
    store(&mut cpu, &parent, &ram, USERSTACK - 8, 0xC3).unwrap();
    let used = alloc.stats().total - alloc.stats().free;

    let child = Process {
        space: Some(parent.space.as_ref().unwrap().try_clone().unwrap()),
    };
    assert_eq!(alloc.stats().total - alloc.stats().free, 2 * used);

    // switching address spaces flushes the TLB
    switch(&mut cpu);
    assert_eq!(load(&mut cpu, &child, &ram, TEXT + 0x123), Ok(0xA1));
    assert_eq!(load(&mut cpu, &child, &ram, DATA + 0xFFF), Ok(0xB2));
    assert_eq!(load(&mut cpu, &child, &ram, USERSTACK - 8), Ok(0xC3));
    store(&mut cpu, &child, &ram, DATA + 0xFFF, 0x00).unwrap();

    switch(&mut cpu);
    assert_eq!(load(&mut cpu, &parent, &ram, DATA + 0xFFF), Ok(0xB2));

    let (p, c) = (parent.space.as_ref().unwrap(), child.space.as_ref().unwrap());
    for (a, b) in p.regions().zip(c.regions()) {
        assert_eq!(a.base(), b.base());
        assert_eq!(a.pages(), b.pages());
        assert!(a.frames().iter().all(|f| !b.frames().contains(f)));
    }

    drop(child);
    assert_eq!(alloc.stats().total - alloc.stats().free, used);
    drop(parent);
    assert_eq!(alloc.stats().free, alloc.stats().total);
}

#[test]
fn child_of_a_loaded_process_keeps_text_read_only() {
    let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 65);
    let alloc = FrameAllocator::new(ram.ram_range());
    vm_bootstrap(&alloc, &ram).unwrap();
    let mut cpu = cpu();

    let mut parent = Process { space: Some(program(&alloc, &ram)) };
    store(&mut cpu, &parent, &ram, TEXT + 0x20, 0x5A).unwrap();
    parent.space.as_mut().unwrap().complete_load(&mut cpu);

    let child = Process {
        space: Some(parent.space.as_ref().unwrap().try_clone().unwrap()),
    };
    switch(&mut cpu);
    assert_eq!(load(&mut cpu, &child, &ram, TEXT + 0x20), Ok(0x5A));
    assert_eq!(
        store(&mut cpu, &child, &ram, TEXT + 0x20, 0),
        Err(FaultError::ReadOnly {
            address: VirtualAddress::new(TEXT + 0x20)
        })
    );
    store(&mut cpu, &child, &ram, DATA, 1).unwrap();
}

#[test]
fn out_of_memory_rolls_back() {
    // 17 frames: one page of entries, 16 managed
    let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 17);
    let alloc = FrameAllocator::new(ram.ram_range());
    vm_bootstrap(&alloc, &ram).unwrap();
    assert_eq!(alloc.stats().total, 16);

    let mut space = AddressSpace::new(&alloc, &ram);
    space
        .define_region(VirtualAddress::new(TEXT), 0x5000, RegionPermissions::all())
        .unwrap();
    let err = space.prepare_load().unwrap_err();
    assert_eq!(err, AddressSpaceError::OutOfMemory);
    assert_eq!(err.errno(), Errno::NoMemory);
    assert_eq!(alloc.stats().free, 16);
    assert_eq!(space.define_stack(), Err(AddressSpaceError::StackNotPrepared));
    drop(space);

    let mut small = AddressSpace::new(&alloc, &ram);
    small
        .define_region(VirtualAddress::new(TEXT), 0x1000, RegionPermissions::all())
        .unwrap();
    small.prepare_load().unwrap();
    assert_eq!(alloc.stats().free, 16 - 1 - STACK_PAGES as usize);
    assert_eq!(small.define_stack(), Ok(VirtualAddress::new(USERSTACK)));

    // the copy needs 13 more frames; only 3 are left
    assert_eq!(small.try_clone().unwrap_err(), AddressSpaceError::OutOfMemory);
    assert_eq!(alloc.stats().free, 3);

    small.destroy();
    assert_eq!(alloc.stats().free, 16);
}
