//! Procedural macros for the relay dispatch kernel: compile-time slot
//! discovery (§4.5), replacing the original system's reflective handler
//! registry.

extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod crate_path;
pub(crate) mod service_attr;
pub(crate) mod slot_request;

/// Marks an `impl` block as a service's slot table. Scans for
/// `#[relay::slot]`-annotated methods and generates the `Service` trait
/// implementation (`has_slot`/`invoke_slot`) that erases each method's typed
/// request down to the gateway's `Map`.
///
/// ```ignore
/// #[relay::service]
/// impl HelloService {
///     #[relay::slot]
///     async fn hello_slot(&self, req: HelloRequest, resp: &mut SlotResponse) {
///         resp.data = serde_json::json!({ "greeting": req.name });
///     }
/// }
/// ```
///
/// An optional `limited_slots = "slot:rps,..."` argument sets
/// `Service::limited_slots` (see §4.5 rate limiting).
#[proc_macro_attribute]
pub fn service(args: TokenStream, input: TokenStream) -> TokenStream {
    service_attr::expand(args, input)
}

/// Marks a method inside a `#[relay::service]` impl block as a discovered
/// slot. A no-op on its own — consumed and stripped by `#[relay::service]`.
///
/// An optional `rename = "WireName"` argument sets the slot's externally
/// visible name (defaults to the method name).
#[proc_macro_attribute]
pub fn slot(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Derives `SlotRequest` for a typed slot request struct: every field must
/// be `Option<T>`, annotated with `#[param(...)]` (`rename`, `require`,
/// `insensitive`, `validate`, `type`) as described in §4.5.
#[proc_macro_derive(SlotRequest, attributes(param))]
pub fn derive_slot_request(input: TokenStream) -> TokenStream {
    slot_request::expand(input)
}
