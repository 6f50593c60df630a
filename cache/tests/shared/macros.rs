/// Saves one tagged item per line, with the key as payload.
#[macro_export]
macro_rules! fixture {
    ( $pool:ident ; $( $key:literal => [ $( $tag:literal ),+ ] ; )* ) => {{
        $(
            let item = cache::TaggableItem::new($key)
                .with_payload($key)
                .with_tags([ $( $tag ),+ ]);

            assert!($pool.save(item), ":FIXTURE: unable to save {}", $key);
        )*
    }};
}
