use std::panic::{catch_unwind, AssertUnwindSafe};

use tandem::Pull;

fn main() {
    println!("[main] creating coroutine");

    let mut source = Pull::new(|sink| {
        println!("[coroutine] sending 42");
        sink.send(42);

        println!("[coroutine] panicking");
        panic!("foobar");
    });
    println!("[main] got value {} from coroutine", source.peek());

    println!("[main] resuming coroutine");
    let result = catch_unwind(AssertUnwindSafe(|| {
        source.resume();
    }));
    println!(
        "[main] caught panic \"{}\" from coroutine",
        result.unwrap_err().downcast_ref::<&'static str>().unwrap()
    );
    assert!(source.is_complete());

    println!("[main] exiting");
}

#[test]
fn panic() {
    main()
}
