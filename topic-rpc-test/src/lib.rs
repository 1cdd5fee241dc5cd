/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Test harness attribute for `topic-rpc`.
//!
//! `#[rpc_test]` turns an `async fn` into a `#[test]` that runs on a fresh
//! multi-thread Tokio runtime. Transport deliveries in `topic-rpc` happen on
//! spawned tasks, so the runtime needs worker threads of its own while the
//! test body awaits replies.
//!
//! A panic raised on any worker (for example inside a delivery callback) is
//! captured by a hook and re-raised on the test thread with its location,
//! so a failing assertion inside a callback fails the test instead of only
//! killing a background task.

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

#[proc_macro_attribute]
pub fn rpc_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    let async_name = syn::Ident::new(&format!("__{}_async", name), name.span());

    let output = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use std::panic;
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;

            #[derive(Default)]
            struct CapturedPanic {
                occurred: AtomicBool,
                message: parking_lot::Mutex<Option<String>>,
                location: parking_lot::Mutex<Option<String>>,
            }

            let captured = Arc::new(CapturedPanic::default());
            let hook_capture = Arc::clone(&captured);

            let orig_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                hook_capture.occurred.store(true, Ordering::SeqCst);
                let message = info
                    .payload()
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| info.payload().downcast_ref::<String>().cloned());
                *hook_capture.message.lock() = message.clone();
                *hook_capture.location.lock() = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                tracing::error!(
                    "Panic: {}",
                    message
                        .unwrap_or_else(|| "No error message".to_string())
                        .trim()
                        .replace('\n', " ")
                );
                orig_hook(info);
            }));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .expect("failed to build test runtime");

            let result = runtime.block_on(async {
                let test_span = tracing::info_span!("rpc_test", name = stringify!(#name));
                let _enter = test_span.enter();

                #async_name().await
            });

            runtime.shutdown_timeout(std::time::Duration::from_secs(1));

            if captured.occurred.load(Ordering::SeqCst) {
                let location = captured
                    .location
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown location".to_string());
                let message = captured
                    .message
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "No error message".to_string())
                    .trim()
                    .replace('\n', " ");
                panic!("Panic at {}: {}", location, message);
            }

            result.unwrap()
        }

        async fn #async_name(#inputs) #output #body
    };

    output.into()
}
