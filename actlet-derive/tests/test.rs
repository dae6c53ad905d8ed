use actlet::Action;
use actlet::Message;
use actlet::Signal;
use static_assertions::assert_impl_all;
use static_assertions::assert_not_impl_any;
use static_assertions::assert_type_eq_all;

#[derive(Message)]
struct Signal0;
assert_impl_all!(Signal0: Message, Signal);
assert_not_impl_any!(Signal0: Action);
assert_type_eq_all!(<Signal0 as Message>::Reply, ());

#[derive(Message)]
#[reply()]
struct Unit;
assert_impl_all!(Unit: Message, Action);
assert_type_eq_all!(<Unit as Message>::Reply, ());

#[derive(Message)]
#[reply("usize")]
struct Quoted;
assert_impl_all!(Quoted: Message, Action);
assert_type_eq_all!(<Quoted as Message>::Reply, usize);

#[derive(Message)]
#[reply(Option<String>)]
struct Bare;
assert_impl_all!(Bare: Message, Action);
assert_type_eq_all!(<Bare as Message>::Reply, Option<String>);

#[derive(Message)]
#[reply("Result<Vec<usize>, actlet::Error>")]
struct Nested;
assert_impl_all!(Nested: Message, Action);
assert_type_eq_all!(<Nested as Message>::Reply, Result<Vec<usize>, actlet::Error>);

#[derive(Message)]
#[reply("T")]
struct Generic<T: Send>(T);
assert_impl_all!(Generic<u8>: Message, Action);
assert_type_eq_all!(<Generic<u8> as Message>::Reply, u8);
