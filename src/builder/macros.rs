//! Macros for declaring plain states and events.

/// Declare unit state types usable in a machine with any context.
///
/// Each state gets `Default` and `Debug` and no-op entry and exit callbacks.
///
/// # Example
///
/// ```
/// use hsm::states;
///
/// states! {
///     pub Empty,
///     Open,
///     /// Playing a track
///     Playing,
/// }
///
/// let _state = Playing;
/// ```
#[macro_export]
macro_rules! states {
    ($($(#[$meta:meta])* $vis:vis $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            $vis struct $name;

            impl<C: 'static> $crate::core::State<C> for $name {}
        )*
    };
}

/// Declare unit event types.
///
/// # Example
///
/// ```
/// use hsm::core::Event;
/// use hsm::events;
///
/// events!(pub Play, Stop);
///
/// let event: &dyn Event = &Play;
/// assert_eq!(event.name(), "Play");
/// ```
#[macro_export]
macro_rules! events {
    ($($(#[$meta:meta])* $vis:vis $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            $vis struct $name;

            impl $crate::core::Event for $name {}
        )*
    };
}
