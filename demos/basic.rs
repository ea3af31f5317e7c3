use tandem::Pull;

fn main() {
    println!("[main] creating coroutine");

    let mut source = Pull::new(|sink| {
        println!("[coroutine] coroutine started");
        for i in 0..5 {
            println!("[coroutine] sending {}", i);
            sink.send(i);
            println!("[coroutine] resumed by parent");
        }
        println!("[coroutine] exiting coroutine");
    });

    while !source.is_complete() {
        println!("[main] got {} from coroutine", source.peek());
        source.resume();
    }

    println!("[main] exiting");
}

#[test]
fn basic() {
    main()
}
