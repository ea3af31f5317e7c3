use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use super::flag;
use crate::control::Side;
use crate::{Attributes, Pull};

#[test]
fn smoke() {
    let hit = Rc::new(Cell::new(false));
    let hit2 = hit.clone();
    let source = Pull::<i32>::new(move |_| {
        hit2.set(true);
    });
    assert!(hit.get());
    assert!(source.is_complete());
    assert!(!source.has_value());
}

#[test]
fn runs_to_first_value() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let log2 = log.clone();
    let mut source = Pull::new(move |sink| {
        log2.borrow_mut().push("started");
        sink.send(1);
        log2.borrow_mut().push("resumed");
        sink.send(2);
    });
    assert_eq!(*log.borrow(), ["started"]);
    assert!(source.has_value());
    assert_eq!(*source.peek(), 1);

    source.resume();
    assert_eq!(*log.borrow(), ["started", "resumed"]);
    assert_eq!(*source.peek(), 2);

    source.resume();
    assert!(source.is_complete());
    assert!(!source.has_value());
}

#[test]
fn sequence() {
    let mut source = Pull::new(|sink| {
        let (mut first, mut second) = (1, 1);
        sink.send(first);
        for _ in 0..9 {
            let third = first + second;
            first = second;
            second = third;
            sink.send(third);
        }
    });
    let values: Vec<i32> = source.iter().collect();
    assert_eq!(values, [1, 2, 3, 5, 8, 13, 21, 34, 55, 89]);
    assert!(source.is_complete());
}

#[test]
fn peek_is_idempotent() {
    let source = Pull::new(|sink| {
        sink.send("hello".to_string());
    });
    assert_eq!(source.peek(), "hello");
    assert_eq!(source.peek(), "hello");
    assert!(source.has_value());
}

#[test]
fn take_moves_value() {
    let mut source = Pull::new(|sink| {
        sink.send(Box::new(7));
        sink.send(Box::new(8));
    });
    assert_eq!(source.take(), Some(Box::new(7)));
    assert!(!source.has_value());
    assert_eq!(source.take(), None);

    source.resume();
    assert_eq!(source.take(), Some(Box::new(8)));

    source.resume();
    assert!(source.is_complete());
    assert_eq!(source.take(), None);
}

#[test]
fn untaken_value_is_dropped() {
    let value = Rc::new(());
    let value2 = value.clone();
    let mut source = Pull::new(move |sink| {
        sink.send(value2);
        sink.send(Rc::new(()));
    });
    assert_eq!(Rc::strong_count(&value), 2);
    source.resume();
    assert_eq!(Rc::strong_count(&value), 1);
    drop(source);
}

#[test]
fn empty_body() {
    let mut source = Pull::<String>::new(|_| {});
    assert!(source.is_complete());
    assert!(!source.has_value());
    assert_eq!(source.iter().count(), 0);
}

#[test]
#[should_panic = "attempt to resume a completed coroutine"]
fn resume_completed() {
    let mut source = Pull::new(|sink| {
        sink.send(1);
    });
    source.resume();
    source.resume();
}

#[test]
#[should_panic = "no value available"]
fn peek_completed() {
    let source = Pull::<i32>::new(|_| {});
    source.peek();
}

#[test]
#[should_panic = "no value available"]
fn peek_taken() {
    let mut source = Pull::new(|sink| {
        sink.send(1);
    });
    source.take();
    source.peek();
}

#[test]
#[should_panic = "foobar"]
fn panics_propagated() {
    let (a, b) = flag();
    let mut source = Pull::new(move |sink| {
        sink.send(1);
        drop(b);
        panic!("foobar");
    });
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        source.resume();
    }));
    assert!(result.is_err());
    assert!(a.get());
    assert!(source.is_complete());
    assert!(!source.has_value());
    panic::resume_unwind(result.unwrap_err());
}

#[test]
#[should_panic = "foobar"]
fn panics_before_first_value() {
    let _source = Pull::<i32>::new(|_| panic!("foobar"));
}

#[test]
fn drop_unwinds_body() {
    let (a, a_drop) = flag();
    let (b, b_drop) = flag();
    let after = Rc::new(Cell::new(false));
    let after2 = after.clone();
    let source = Pull::new(move |sink| {
        let _a = a_drop;
        sink.send(1);
        after2.set(true);
        drop(b_drop);
    });
    assert!(!a.get());
    drop(source);
    assert!(a.get());
    assert!(b.get());
    assert!(!after.get());
}

#[test]
fn drop_completed() {
    let (a, a_drop) = flag();
    let mut source = Pull::new(move |sink| {
        sink.send(1);
        drop(a_drop);
    });
    source.resume();
    assert!(a.get());
    assert!(source.is_complete());
    drop(source);
}

#[test]
fn iter_starts_at_current_value() {
    let mut source = Pull::new(|sink| {
        for i in 0..5 {
            sink.send(i);
        }
    });
    source.resume();
    let mut iter = source.iter();
    assert_eq!(iter.next(), Some(1));
    assert_eq!(iter.next(), Some(2));
    drop(iter);

    let rest: Vec<i32> = (&mut source).into_iter().collect();
    assert_eq!(rest, [3, 4]);
}

#[test]
fn iter_is_fused() {
    let mut source = Pull::new(|sink| {
        sink.send(1);
    });
    let mut iter = source.iter();
    assert_eq!(iter.next(), Some(1));
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next(), None);
}

#[test]
fn iter_partial_then_drop() {
    let (a, a_drop) = flag();
    let mut source = Pull::new(move |sink| {
        let _a = a_drop;
        for i in 0.. {
            sink.send(i);
        }
    });
    let first: Vec<u32> = source.iter().take(3).collect();
    assert_eq!(first, [0, 1, 2]);
    assert!(!source.is_complete());
    drop(source);
    assert!(a.get());
}

#[test]
fn stateful() {
    #[repr(align(128))]
    struct Aligned(u8);
    let state = [41, 42, 43, 44, 45];
    let aligned = Aligned(100);
    let mut source = Pull::new(move |sink| {
        assert_eq!(&aligned as *const _ as usize % 128, 0);
        for i in state {
            sink.send(i);
        }
        assert_eq!(aligned.0, 100);
    });
    for i in state {
        assert_eq!(source.take(), Some(i));
        source.resume();
    }
    assert!(source.is_complete());
}

#[test]
fn large_values() {
    let mut source = Pull::new(|sink| {
        for i in 0..4u64 {
            sink.send([i; 64]);
        }
    });
    for (i, value) in source.iter().enumerate() {
        assert_eq!(value, [i as u64; 64]);
    }
}

#[test]
fn nested() {
    let mut outer = Pull::new(|sink| {
        let mut inner = Pull::new(|sink| {
            for i in 1..=3 {
                sink.send(i);
            }
        });
        for i in inner.iter() {
            sink.send(i * 10);
        }
    });
    let values: Vec<i32> = outer.iter().collect();
    assert_eq!(values, [10, 20, 30]);
}

#[test]
fn sides_take_turns() {
    let mut source = Pull::new(|sink| {
        for _ in 0..3 {
            assert_eq!(sink.handle.block.running.get(), Side::Callee);
            assert_eq!(sink.handle.side, Side::Callee);
            sink.send(());
        }
    });
    assert_eq!(source.handle.side, Side::Caller);
    while !source.is_complete() {
        assert_eq!(source.handle.block.running.get(), Side::Caller);
        source.resume();
    }
    assert_eq!(source.handle.block.running.get(), Side::Caller);
}

// Make sure that the stack is large enough for code that actually uses it.
#[test]
fn stack_growth() {
    let mut source = Pull::new(|sink| {
        fn recurse(i: u32, p: &mut [u8; 10000]) {
            unsafe {
                // Ensure the stack allocation isn't optimized away.
                ptr::read_volatile(&p);
            }
            if i > 0 {
                recurse(i - 1, &mut [0; 10000]);
            }
        }

        // Use ~500KB of stack.
        recurse(50, &mut [0; 10000]);
        sink.send(());
    });
    assert!(source.has_value());
    source.resume();
    assert!(source.is_complete());
}

// Linked backtraces are not supported on x86 Windows.
#[cfg_attr(all(windows, target_arch = "x86"), ignore)]
#[test]
fn backtrace_traces_to_host() {
    #[inline(never)] // try to get this to show up in backtraces
    fn look_for_me() {
        run_test();
    }
    fn assert_contains_host() {
        let trace = backtrace::Backtrace::new();
        println!("{:?}", trace);
        assert!(trace
            .frames()
            .iter()
            .flat_map(|f| f.symbols())
            .filter_map(|s| Some(s.name()?.to_string()))
            .any(|s| s.contains("look_for_me")));
    }

    fn run_test() {
        assert_contains_host();
        let mut source = Pull::new(|sink| {
            assert_contains_host();
            sink.send(());
            assert_contains_host();
        });
        source.resume();
        assert!(source.is_complete());
    }

    look_for_me();
}

#[cfg(target_arch = "x86_64")]
#[test]
fn preserve_fpu() {
    use core::arch::asm;

    fn mxcsr() -> u32 {
        let mut value = 0u32;
        unsafe {
            asm!("stmxcsr dword ptr [{}]", in(reg) ptr::addr_of_mut!(value), options(nostack));
        }
        // Ignore the sticky exception flags.
        value & !0x3f
    }
    fn set_mxcsr(value: u32) {
        unsafe {
            asm!("ldmxcsr dword ptr [{}]", in(reg) ptr::addr_of!(value), options(nostack, readonly));
        }
    }

    // Rounding control bits: round toward zero.
    const ROUND_TOWARD_ZERO: u32 = 0x6000;

    let host = mxcsr();
    let attributes = Attributes::default().preserve_fpu(true);
    let mut source = Pull::with_allocator(crate::stack::FixedSize, attributes, move |sink| {
        set_mxcsr(host | ROUND_TOWARD_ZERO);
        sink.send(mxcsr());
        sink.send(mxcsr());
    })
    .unwrap();

    assert_eq!(source.take(), Some(host | ROUND_TOWARD_ZERO));
    assert_eq!(mxcsr(), host);
    source.resume();
    assert_eq!(source.take(), Some(host | ROUND_TOWARD_ZERO));
    assert_eq!(mxcsr(), host);
    source.resume();
    assert!(source.is_complete());
    assert_eq!(mxcsr(), host);
}

#[test]
fn debug_output() {
    let source = Pull::new(|sink| {
        sink.send(1);
    });
    assert_eq!(
        format!("{:?}", source),
        "Pull { has_value: true, complete: false }"
    );
}

#[test]
fn three_values_then_return() {
    let mut source = Pull::new(|sink| {
        sink.send(1).send(2).send(3);
    });
    let mut seen = Vec::new();
    while source.has_value() {
        seen.push(*source.peek());
        source.resume();
    }
    assert_eq!(seen, [1, 2, 3]);
    assert!(source.is_complete());
}

#[test]
fn endless_unit_body_dropped() {
    let unwinds = Rc::new(Cell::new(0));
    let unwinds2 = unwinds.clone();
    let mut source = Pull::new(move |sink| loop {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.send(());
        }));
        if let Err(payload) = result {
            assert!(crate::is_forced_unwind(&*payload));
            unwinds2.set(unwinds2.get() + 1);
            panic::resume_unwind(payload);
        }
    });
    source.resume();
    source.resume();
    assert_eq!(unwinds.get(), 0);
    drop(source);
    assert_eq!(unwinds.get(), 1);
}

#[test]
fn panic_on_second_value() {
    let mut source = Pull::new(|sink| {
        sink.send(1);
        panic!("second value");
    });
    assert_eq!(*source.peek(), 1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        source.resume();
    }));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&'static str>(), Some(&"second value"));
    assert!(source.is_complete());
}

#[test]
fn iter_after_partial_iter() {
    let mut source = Pull::new(|sink| {
        for i in 0..4 {
            sink.send(i);
        }
    });
    let first: Vec<i32> = source.iter().take(2).collect();
    assert_eq!(first, [0, 1]);
    let rest: Vec<i32> = source.iter().collect();
    assert_eq!(rest, [2, 3]);
    assert!(source.is_complete());
}

#[test]
fn iter_after_take() {
    let mut source = Pull::new(|sink| {
        for i in 0..3 {
            sink.send(i);
        }
    });
    assert_eq!(source.take(), Some(0));
    let rest: Vec<i32> = source.iter().collect();
    assert_eq!(rest, [1, 2]);
    assert!(source.is_complete());
}
