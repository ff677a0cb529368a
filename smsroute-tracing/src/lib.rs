#![warn(clippy::pedantic)]

//! `#[traced]`: span and enter/exit events for smsroute operations.
//!
//! Parameters named after routing concepts are recorded on the span without
//! being listed, so every operation on a message, a traffic class, or a
//! selection connection carries the same field names:
//!
//! | parameter    | field                                  |
//! |--------------|----------------------------------------|
//! | `request`    | `destination = %request.destination`   |
//! | `tracker`    | `message_id = tracker.message_id()`    |
//! | `class`      | `class = %class`                       |
//! | `connection` | `connection = %connection`             |
//! | `domain`     | `domain = %domain`                     |
//! | `cause`      | `cause = cause`                        |
//! | `outcome`    | `outcome = ?outcome`                   |

extern crate proc_macro;

use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{
    FnArg, ItemFn, LitStr, Pat, Signature, Token, parenthesized, parse::Parse, parse_macro_input,
    parse_quote,
};

mod keywords {
    syn::custom_keyword!(level);
    syn::custom_keyword!(timing);
    syn::custom_keyword!(fields);
}

/// Unit the exit event reports elapsed time in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timing {
    Micros,
    Millis,
    Seconds,
}

impl Timing {
    fn from_lit(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "us" | "micros" => Ok(Self::Micros),
            "ms" | "millis" => Ok(Self::Millis),
            "s" | "secs" => Ok(Self::Seconds),
            other => Err(syn::Error::new(
                lit.span(),
                format!("unknown timing unit `{other}`, expected one of us, ms, s"),
            )),
        }
    }

    fn exit_event(self, name: &str) -> TokenStream {
        let (elapsed, unit) = match self {
            Self::Micros => (quote!(as_micros), "us"),
            Self::Millis => (quote!(as_millis), "ms"),
            Self::Seconds => (quote!(as_secs), "s"),
        };
        quote! {
            tracing::trace!(
                elapsed = self.started.elapsed().#elapsed(),
                unit = #unit,
                "Leaving {}",
                #name
            );
        }
    }
}

struct Options {
    level: Ident,
    timing: Option<Timing>,
    fields: Option<TokenStream>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            level: Ident::new("TRACE", proc_macro2::Span::call_site()),
            timing: None,
            fields: None,
        }
    }
}

impl Parse for Options {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut options = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::level) {
                input.parse::<keywords::level>()?;
                input.parse::<Token![=]>()?;
                let level: Ident = input.parse()?;
                match level.to_string().as_str() {
                    "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" => options.level = level,
                    other => {
                        return Err(syn::Error::new(
                            level.span(),
                            format!("unknown level `{other}`"),
                        ));
                    }
                }
            } else if lookahead.peek(keywords::timing) {
                input.parse::<keywords::timing>()?;
                input.parse::<Token![=]>()?;
                options.timing = Some(Timing::from_lit(&input.parse()?)?);
            } else if lookahead.peek(keywords::fields) {
                input.parse::<keywords::fields>()?;
                let content;
                parenthesized!(content in input);
                options.fields = Some(content.parse()?);
            } else {
                return Err(lookahead.error());
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(options)
    }
}

/// Span fields for the routing parameters `sig` takes, in declaration order.
fn routing_fields(sig: &Signature) -> Vec<TokenStream> {
    sig.inputs
        .iter()
        .filter_map(|input| match input {
            FnArg::Typed(arg) => match &*arg.pat {
                Pat::Ident(pat) => Some(&pat.ident),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        })
        .filter_map(|ident| match ident.to_string().as_str() {
            "request" => Some(quote!(destination = %#ident.destination)),
            "tracker" => Some(quote!(message_id = #ident.message_id())),
            "class" => Some(quote!(class = %#ident)),
            "connection" => Some(quote!(connection = %#ident)),
            "domain" => Some(quote!(domain = %#ident)),
            "cause" => Some(quote!(cause = #ident)),
            "outcome" => Some(quote!(outcome = ?#ident)),
            _ => None,
        })
        .collect()
}

fn expand(options: Options, mut item_fn: ItemFn) -> TokenStream {
    let name = item_fn.sig.ident.to_string();
    let level = &options.level;

    let mut fields = routing_fields(&item_fn.sig);
    if let Some(extra) = options.fields {
        fields.push(extra);
    }

    let fields = (!fields.is_empty()).then(|| quote!(, fields(#(#fields),*)));
    item_fn.attrs.push(parse_quote! {
        #[tracing::instrument(level = tracing::Level::#level, skip_all #fields)]
    });
    item_fn.attrs.push(parse_quote! {
        #[allow(clippy::items_after_statements)]
    });

    let (state, init, exit) = match options.timing {
        Some(timing) => (
            quote!({ started: std::time::Instant }),
            quote!({ started: std::time::Instant::now() }),
            timing.exit_event(&name),
        ),
        None => (
            quote!(;),
            TokenStream::new(),
            quote!(tracing::trace!("Leaving {}", #name);),
        ),
    };

    let guard: Vec<syn::Stmt> = parse_quote! {
        struct __Traced #state

        impl std::ops::Drop for __Traced {
            fn drop(&mut self) {
                #exit
            }
        }

        tracing::trace!("Entering {}", #name);
        let __traced = __Traced #init;
    };

    let body = std::mem::take(&mut item_fn.block.stmts);
    item_fn.block.stmts = guard.into_iter().chain(body).collect();
    quote!(#item_fn)
}

/// Wrap a function in a `tracing` span and emit trace events when it is
/// entered and left.
///
/// Accepts `level = DEBUG` (default `TRACE`), `timing = "ms"` to report the
/// elapsed time on exit, and `fields(...)` for span fields beyond the ones
/// derived from routing parameters.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let options = parse_macro_input!(args as Options);
    let item_fn = parse_macro_input!(item as ItemFn);

    expand(options, item_fn).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_strings(sig: &Signature) -> Vec<String> {
        routing_fields(sig)
            .into_iter()
            .map(|field| field.to_string().replace(' ', ""))
            .collect()
    }

    #[test]
    fn routing_parameters_become_fields() {
        let sig: Signature = parse_quote! {
            fn on_send_outcome(&mut self, tracker: MessageTracker, domain: Domain, outcome: TransportOutcome)
        };

        assert_eq!(
            field_strings(&sig),
            [
                "message_id=tracker.message_id()",
                "domain=%domain",
                "outcome=?outcome"
            ]
        );
    }

    #[test]
    fn other_parameters_are_skipped() {
        let sig: Signature = parse_quote! {
            fn on_domain_selected(&mut self, class: TrafficClass, connection: ConnectionId, result: Result<Domain, SelectionError>)
        };
        assert_eq!(field_strings(&sig), ["class=%class", "connection=%connection"]);

        let sig: Signature = parse_quote! {
            async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>)
        };
        assert!(field_strings(&sig).is_empty());
    }

    #[test]
    fn options_parse() {
        let options: Options = syn::parse_str(r#"level = DEBUG, timing = "ms""#).unwrap();
        assert_eq!(options.level, "DEBUG");
        assert_eq!(options.timing, Some(Timing::Millis));
        assert!(options.fields.is_none());

        let options: Options = syn::parse_str("fields(cause = 3)").unwrap();
        assert_eq!(options.level, "TRACE");
        assert!(options.fields.is_some());

        assert!(syn::parse_str::<Options>("level = LOUD").is_err());
        assert!(syn::parse_str::<Options>(r#"timing = "days""#).is_err());
        assert!(syn::parse_str::<Options>("instrument(skip_all)").is_err());
    }

    #[test]
    fn expansion_instruments_and_guards() {
        let item: ItemFn = parse_quote! {
            fn send_retry(&mut self, tracker: MessageTracker) {}
        };
        let expanded = expand(syn::parse_str("level = DEBUG").unwrap(), item).to_string();

        assert!(expanded.contains("tracing :: instrument"));
        assert!(expanded.contains("tracing :: Level :: DEBUG"));
        assert!(expanded.contains("message_id = tracker . message_id ()"));
        assert!(expanded.contains("__Traced"));
    }
}
