//! The engine worker thread.
//!
//! The worker owns the Boa context for its whole life and executes tasks in
//! the order they arrive, which is what serializes host evaluation against
//! debugger work.

use std::collections::VecDeque;
use std::sync::mpsc;

use boa_engine::{Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source, js_string};

use super::DebugChannel;
use crate::debugger::protocol::Processor;
use crate::{Error, Result};

/// Task to be executed on the worker thread.
pub(super) enum EngineTask {
    /// Evaluate a script.
    Eval {
        source: String,
        result_tx: mpsc::Sender<Result<String>>,
    },
    /// Call a global function with JSON arguments.
    Call {
        function: String,
        args: String,
        result_tx: mpsc::Sender<Result<String>>,
    },
    /// Run buffered debug commands and deliver the produced messages.
    ProcessDebugMessages { done_tx: mpsc::Sender<()> },
    /// Terminate the worker thread.
    Terminate,
}

pub(super) fn run(task_rx: &mpsc::Receiver<EngineTask>, debug: &DebugChannel, console: bool) {
    let mut context = match Context::builder().build() {
        Ok(context) => context,
        Err(err) => {
            log::error!("failed to build engine context: {err}");
            return;
        }
    };

    if console {
        install_console(&mut context);
    }

    let mut processor = Processor::new();
    let mut session = debug.session();

    while let Ok(task) = task_rx.recv() {
        match task {
            EngineTask::Eval { source, result_tx } => {
                let _ = result_tx.send(eval_to_json(&mut context, &source));
            }
            EngineTask::Call {
                function,
                args,
                result_tx,
            } => {
                let _ = result_tx.send(call_to_json(&mut context, &function, &args));
            }
            EngineTask::ProcessDebugMessages { done_tx } => {
                let (current, commands) = debug.take_commands();
                if current != session {
                    session = current;
                    processor.reset();
                }
                process_debug_messages(&mut context, &mut processor, debug, session, commands);
                let _ = done_tx.send(());
            }
            EngineTask::Terminate => {
                log::trace!("engine worker terminating");
                break;
            }
        }
    }
}

fn process_debug_messages(
    context: &mut Context,
    processor: &mut Processor,
    debug: &DebugChannel,
    session: u64,
    commands: VecDeque<Vec<u8>>,
) {
    for command in commands {
        for message in processor.process(&command, context) {
            // Looked up per message: a detach or re-attach in between stops
            // delivery.
            match debug.callback_for(session) {
                Some(callback) => callback(message),
                None => log::trace!("debug session {session} is over, dropping message"),
            }
        }
    }
}

#[cfg(feature = "console")]
fn install_console(context: &mut Context) {
    use boa_engine::property::Attribute;
    use boa_runtime::Console;

    let console = Console::init(context);
    if let Err(err) =
        context.register_global_property(js_string!("console"), console, Attribute::all())
    {
        log::warn!("failed to register console: {err}");
    }
}

#[cfg(not(feature = "console"))]
fn install_console(_context: &mut Context) {
    log::warn!("console requested but boa_eval was built without the `console` feature");
}

/// Evaluates `source` and converts the completion value to JSON text.
pub(crate) fn eval_to_json(context: &mut Context, source: &str) -> Result<String> {
    let value = context
        .eval(Source::from_bytes(source))
        .map_err(|err| exception(&err, context))?;
    stringify(context, &value).map_err(|err| exception(&err, context))
}

fn call_to_json(context: &mut Context, function: &str, args: &str) -> Result<String> {
    let global = context.global_object();
    let target = global
        .get(JsString::from(function), context)
        .map_err(|err| exception(&err, context))?;
    let Some(target) = target.as_callable().cloned() else {
        return Err(Error::NotAFunction(function.to_owned()));
    };

    let arguments = json_method(context, "parse", JsString::from(args).into())
        .ok()
        .filter(|value| value.as_object().is_some_and(JsObject::is_array))
        .ok_or_else(|| Error::InvalidArguments(args.to_owned()))?;

    let result = apply(context, &target, arguments).map_err(|err| exception(&err, context))?;
    stringify(context, &result).map_err(|err| exception(&err, context))
}

/// `target.apply(undefined, arguments)`
fn apply(context: &mut Context, target: &JsObject, arguments: JsValue) -> JsResult<JsValue> {
    let apply = target.get(js_string!("apply"), context)?;
    let apply = apply
        .as_callable()
        .ok_or_else(|| JsNativeError::typ().with_message("Function.prototype.apply is missing"))?;
    apply.call(
        &target.clone().into(),
        &[JsValue::undefined(), arguments],
        context,
    )
}

fn stringify(context: &mut Context, value: &JsValue) -> JsResult<String> {
    let json = json_method(context, "stringify", value.clone())?;
    if json.is_undefined() {
        return Ok("undefined".to_owned());
    }
    Ok(json.to_string(context)?.to_std_string_escaped())
}

/// Calls `JSON[method](argument)` through the script-visible global, so
/// user overrides of `toJSON` and friends behave exactly as in script.
fn json_method(context: &mut Context, method: &str, argument: JsValue) -> JsResult<JsValue> {
    let global = context.global_object();
    let json = global.get(js_string!("JSON"), context)?;
    let json = json
        .as_object()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("JSON is not an object"))?;
    let function = json.get(JsString::from(method), context)?;
    let function = function
        .as_callable()
        .ok_or_else(|| JsNativeError::typ().with_message(format!("JSON.{method} is not a function")))?;
    function.call(&json.clone().into(), &[argument], context)
}

/// Renders a thrown value the way script would print it.
fn exception(err: &JsError, context: &mut Context) -> Error {
    let message = err
        .to_opaque(context)
        .to_string(context)
        .map_or_else(|_| err.to_string(), |message| message.to_std_string_escaped());
    Error::Js(message)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use test_case::test_case;

    use super::*;

    #[test_case("1 + 2", "3" ; "number")]
    #[test_case("'a' + 'b'", r#""ab""# ; "string")]
    #[test_case("({ a: [1, null, true] })", r#"{"a":[1,null,true]}"# ; "object")]
    #[test_case("undefined", "undefined" ; "undefined")]
    #[test_case("(function () {})", "undefined" ; "function")]
    #[test_case("NaN", "null" ; "nan")]
    fn eval_converts_completion_value(source: &str, expected: &str) {
        let mut context = Context::default();
        assert_eq!(eval_to_json(&mut context, source).unwrap(), expected);
    }

    #[test]
    fn eval_reports_exceptions() {
        let mut context = Context::default();

        let err = eval_to_json(&mut context, "throw new RangeError('too far')").unwrap_err();
        assert!(matches!(&err, Error::Js(message) if message == "RangeError: too far"));

        let err = eval_to_json(&mut context, "missing_binding").unwrap_err();
        assert!(matches!(&err, Error::Js(message) if message.starts_with("ReferenceError")));

        let err = eval_to_json(&mut context, "let = ;").unwrap_err();
        assert!(matches!(&err, Error::Js(message) if message.starts_with("SyntaxError")));
    }

    #[test]
    fn eval_reports_unserializable_values() {
        let mut context = Context::default();
        let err = eval_to_json(&mut context, "const o = {}; o.self = o; o").unwrap_err();
        assert!(matches!(&err, Error::Js(message) if message.starts_with("TypeError")));
    }

    #[test]
    fn call_uses_json_arguments() {
        let mut context = Context::default();
        eval_to_json(
            &mut context,
            indoc! {"
                function join(separator, items) {
                    return items.join(separator);
                }
            "},
        )
        .unwrap();

        assert_eq!(
            call_to_json(&mut context, "join", r#"["-", ["a", "b", "c"]]"#).unwrap(),
            r#""a-b-c""#
        );
    }

    #[test]
    fn call_rejects_non_functions() {
        let mut context = Context::default();
        eval_to_json(&mut context, "var notCallable = 3;").unwrap();

        assert!(matches!(
            call_to_json(&mut context, "notCallable", "[]"),
            Err(Error::NotAFunction(name)) if name == "notCallable"
        ));
        assert!(matches!(
            call_to_json(&mut context, "doesNotExist", "[]"),
            Err(Error::NotAFunction(_))
        ));
    }

    #[test_case("{}" ; "object")]
    #[test_case("not json" ; "malformed")]
    #[test_case("42" ; "number")]
    fn call_rejects_non_array_arguments(args: &str) {
        let mut context = Context::default();
        eval_to_json(&mut context, "function id(x) { return x; }").unwrap();

        assert!(matches!(
            call_to_json(&mut context, "id", args),
            Err(Error::InvalidArguments(given)) if given == args
        ));
    }

    #[test]
    fn call_reports_exceptions() {
        let mut context = Context::default();
        eval_to_json(&mut context, "function fail() { throw new Error('boom'); }").unwrap();

        assert!(matches!(
            call_to_json(&mut context, "fail", "[]"),
            Err(Error::Js(message)) if message == "Error: boom"
        ));
    }
}
