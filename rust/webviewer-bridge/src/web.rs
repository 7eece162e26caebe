//! Web bindings for the `webviewer-bridge` crate.
//!
//! Example usage in the page loaded by the WebViewer:
//!
//! ```ignore
//! // This is JavaScript code that uses the WASM bindings, not a Rust doctest
//! import init, { install, performScript, executeQuery, executeDataAction } from "webviewer-bridge";
//!
//! await init();
//! install({ viewerName: "invoices", acquisition: "trap" });
//!
//! const total = await performScript("Invoice Total", { id: 42 });
//! const rows = await executeQuery("SELECT name FROM customers WHERE region = ?", ["North"]);
//!
//! const records = await executeDataAction({ layouts: "Invoices", limit: 10 });
//! console.log(records.foundCount, records[0].recordId, { ...records[0] });
//! ```
//!
//! `install` defines the two global functions the host calls to report
//! results, `onCallSucceeded(callId, result)` and `onCallFailed(callId,
//! error)`.

use std::{cell::RefCell, sync::Arc};

use js_sys::{Array, Function, JSON, Object, Reflect};
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::{
    AcquisitionStrategy, Bindings, Bridge, BridgeConfig, BridgeError, CallId, CallOptions,
    DataAction, DataApiRequest, Host, HostInstaller, RecordSet, ScriptOption,
};

const SUCCEEDED_ENTRY_POINT: &str = "onCallSucceeded";
const FAILED_ENTRY_POINT: &str = "onCallFailed";

/// The host's call interface object, as injected into the page
#[derive(Debug, Clone)]
pub struct JsHost {
    handle: JsValue,
}

impl JsHost {
    fn method(&self, name: &str) -> Result<Function, BridgeError> {
        Reflect::get(&self.handle, &JsValue::from_str(name))
            .ok()
            .and_then(|method| method.dyn_into::<Function>().ok())
            .ok_or_else(|| BridgeError::Host(format!("host does not offer {name}")))
    }
}

impl Host for JsHost {
    fn perform_script(&self, name: &str, parameter: &str) -> Result<(), BridgeError> {
        self.method("PerformScript")?
            .call2(
                &self.handle,
                &JsValue::from_str(name),
                &JsValue::from_str(parameter),
            )
            .map_err(|error| BridgeError::Host(describe(&error)))?;
        Ok(())
    }

    fn perform_script_with_option(
        &self,
        name: &str,
        parameter: &str,
        option: ScriptOption,
    ) -> Result<(), BridgeError> {
        self.method("PerformScriptWithOption")?
            .call3(
                &self.handle,
                &JsValue::from_str(name),
                &JsValue::from_str(parameter),
                &JsValue::from_str(&option.to_string()),
            )
            .map_err(|error| BridgeError::Host(describe(&error)))?;
        Ok(())
    }
}

fn present(value: JsValue) -> Option<JsValue> {
    (!value.is_undefined() && !value.is_null()).then_some(value)
}

fn locate(global_name: &str) -> Option<Arc<JsHost>> {
    let handle = Reflect::get(&js_sys::global(), &JsValue::from_str(global_name)).ok()?;
    present(handle).map(|handle| Arc::new(JsHost { handle }))
}

/// An accessor property standing in for the host global until the host
/// assigns it
struct Trap {
    key: JsValue,
    _get: Closure<dyn Fn() -> JsValue>,
    _set: Closure<dyn Fn(JsValue)>,
}

impl Trap {
    fn set(key: &str, installer: HostInstaller<JsHost>) -> Result<Option<Self>, JsValue> {
        let global = js_sys::global();
        let key = JsValue::from_str(key);

        if let Some(handle) = present(Reflect::get(&global, &key)?) {
            installer.install(Arc::new(JsHost { handle }));
            return Ok(None);
        }

        let setter_key = key.clone();
        let set = Closure::<dyn Fn(JsValue)>::new(move |value: JsValue| {
            // Replaced by a plain property on first assignment, so the host
            // sees an ordinary global from then on
            if let Err(error) = define_value(&js_sys::global(), &setter_key, &value, true) {
                tracing::error!(error = %describe(&error), "Could not replace the host trap");
            }
            if let Some(handle) = present(value) {
                installer.install(Arc::new(JsHost { handle }));
            }
        });
        let get = Closure::<dyn Fn() -> JsValue>::new(|| JsValue::UNDEFINED);

        let descriptor = Object::new();
        Reflect::set(&descriptor, &"configurable".into(), &JsValue::TRUE)?;
        Reflect::set(&descriptor, &"get".into(), get.as_ref())?;
        Reflect::set(&descriptor, &"set".into(), set.as_ref())?;
        Object::define_property(&global, &key, &descriptor);

        Ok(Some(Self {
            key,
            _get: get,
            _set: set,
        }))
    }

    /// Remove the accessor if the host never assigned the global
    fn dispose(self) {
        let global = js_sys::global();
        let still_trapped = Object::get_own_property_descriptor(&global, &self.key)
            .dyn_into::<Object>()
            .ok()
            .and_then(|descriptor| Reflect::get(&descriptor, &"set".into()).ok())
            .is_some_and(|setter| !setter.is_undefined());

        if still_trapped {
            let _ = Reflect::delete_property(&global, &self.key);
        }
    }
}

struct Installation {
    bridge: Bridge<JsHost>,
    _succeeded: Closure<dyn Fn(JsValue, JsValue) -> bool>,
    _failed: Closure<dyn Fn(JsValue, JsValue) -> bool>,
}

thread_local! {
    static INSTALLATION: RefCell<Option<Installation>> = const { RefCell::new(None) };
    static TRAP: RefCell<Option<Trap>> = const { RefCell::new(None) };
}

/// Set up the bridge: start acquiring the host and define the global
/// completion entry points. Calling it again has no effect.
#[wasm_bindgen]
pub fn install(config: JsValue) -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    if INSTALLATION.with(|installation| installation.borrow().is_some()) {
        return Ok(());
    }

    let config = match present(config) {
        Some(config) => BridgeConfig::from_json(&stringify(&config)?).map_err(to_js_error)?,
        None => BridgeConfig::default(),
    };

    let bridge = match config.acquisition {
        AcquisitionStrategy::Poll => {
            let global_name = config.host_global.clone();
            Bridge::polling(config, move || locate(&global_name))
        }
        AcquisitionStrategy::Trap => {
            let global_name = config.host_global.clone();
            let (bridge, installer) = Bridge::trapped(config);
            let trap = Trap::set(&global_name, installer)?;
            TRAP.with(|slot| *slot.borrow_mut() = trap);

            let host = bridge.host().clone();
            wasm_bindgen_futures::spawn_local(async move {
                let _ = host.acquire().await;
                if let Some(trap) = TRAP.with(|slot| slot.borrow_mut().take()) {
                    trap.dispose();
                }
            });
            bridge
        }
    };

    let succeeded = entry_point(bridge.clone(), |bridge, call_id, text| {
        bridge.on_call_succeeded(call_id, text)
    });
    let failed = entry_point(bridge.clone(), |bridge, call_id, text| {
        bridge.on_call_failed(call_id, text)
    });

    let global = js_sys::global();
    Reflect::set(&global, &SUCCEEDED_ENTRY_POINT.into(), succeeded.as_ref())?;
    Reflect::set(&global, &FAILED_ENTRY_POINT.into(), failed.as_ref())?;

    INSTALLATION.with(|installation| {
        *installation.borrow_mut() = Some(Installation {
            bridge,
            _succeeded: succeeded,
            _failed: failed,
        })
    });

    Ok(())
}

fn entry_point<F>(bridge: Bridge<JsHost>, deliver: F) -> Closure<dyn Fn(JsValue, JsValue) -> bool>
where
    F: Fn(&Bridge<JsHost>, CallId, String) -> bool + 'static,
{
    Closure::new(move |call_id: JsValue, text: JsValue| {
        let Some(call_id) = parse_call_id(&call_id) else {
            tracing::warn!(call_id = %describe(&call_id), "Ignoring completion with an unreadable call id");
            return false;
        };
        let text = match text.as_string() {
            Some(text) => text,
            None if text.is_undefined() || text.is_null() => String::new(),
            None => stringify(&text).unwrap_or_default(),
        };
        deliver(&bridge, call_id, text)
    })
}

fn parse_call_id(value: &JsValue) -> Option<CallId> {
    if let Some(number) = value.as_f64() {
        return (number >= 0.0 && number.fract() == 0.0).then_some(CallId::from(number as u64));
    }
    value.as_string()?.trim().parse::<u64>().ok().map(CallId::from)
}

fn installed() -> Result<Bridge<JsHost>, JsValue> {
    INSTALLATION
        .with(|installation| {
            installation
                .borrow()
                .as_ref()
                .map(|installation| installation.bridge.clone())
        })
        .ok_or_else(|| js_sys::Error::new("call install() before using the bridge").into())
}

/// Run a host script. Text parameters are sent verbatim, anything else as
/// JSON.
#[wasm_bindgen(js_name = "performScript")]
pub async fn perform_script(
    name: String,
    parameter: JsValue,
    options: JsValue,
) -> Result<JsValue, JsValue> {
    let bridge = installed()?;
    let options = match present(options) {
        Some(options) => from_js::<CallOptions>(&options)?,
        None => CallOptions::default(),
    };

    let result = match parameter.as_string() {
        Some(text) => bridge.perform_script(&name, &text, options).await,
        // An omitted parameter is no parameter at all
        None if parameter.is_undefined() => bridge.perform_script(&name, "", options).await,
        None => {
            let parameter = from_js::<Value>(&parameter)?;
            bridge.perform_script(&name, &parameter, options).await
        }
    }
    .map_err(to_js_error)?;

    to_js(&result)
}

/// Evaluate a host expression with the properties of `bindings` bound as
/// locals
#[wasm_bindgen]
pub async fn evaluate(expression: String, bindings: JsValue) -> Result<JsValue, JsValue> {
    let bridge = installed()?;

    let mut local = Bindings::new();
    if let Some(bindings) = present(bindings) {
        let bindings = bindings.dyn_into::<Object>()?;
        for entry in Object::entries(&bindings).iter() {
            let entry = entry.dyn_into::<Array>()?;
            let name = entry.get(0).as_string().unwrap_or_default();
            local = local
                .bind(&name, from_js::<Value>(&entry.get(1))?)
                .map_err(to_js_error)?;
        }
    }

    let result = bridge
        .evaluate(&expression, &local)
        .await
        .map_err(to_js_error)?;
    to_js(&result)
}

/// Run a SQL query; resolves to an array of rows, each an array of column
/// strings
#[wasm_bindgen(js_name = "executeQuery")]
pub async fn execute_query(sql: String, parameters: JsValue) -> Result<JsValue, JsValue> {
    let bridge = installed()?;
    let parameters = match present(parameters) {
        Some(parameters) => from_js::<Vec<Value>>(&parameters)?,
        None => Vec::new(),
    };

    let rows = bridge
        .execute_query(&sql, &parameters)
        .await
        .map_err(to_js_error)?;
    to_js(&rows)
}

/// Run a data API request. Reads resolve to an array of records whose
/// `recordId` and `modId` are non-enumerable; other actions resolve to the
/// response body.
#[wasm_bindgen(js_name = "executeDataAction")]
pub async fn execute_data_action(request: JsValue) -> Result<JsValue, JsValue> {
    let bridge = installed()?;
    let request = from_js::<DataApiRequest>(&request)?;

    let response = bridge
        .execute_data_action(&request)
        .await
        .map_err(to_js_error)?;

    match response.action() {
        DataAction::Read => records_to_js(&response.records().map_err(to_js_error)?),
        _ => to_js(response.response()),
    }
}

fn records_to_js(records: &RecordSet) -> Result<JsValue, JsValue> {
    let array = Array::new();
    for record in records {
        let object = to_js(&record.to_value())?;
        hide_identity(&object, record.record_id(), record.mod_id())?;

        for (name, rows) in record.portals() {
            let js_rows = Reflect::get(&object, &JsValue::from_str(name))?;
            for (index, row) in rows.iter().enumerate() {
                let js_row = Reflect::get_u32(&js_rows, index as u32)?;
                hide_identity(&js_row, row.record_id(), row.mod_id())?;
            }
        }

        array.push(&object);
    }

    let counts = [
        ("foundCount", records.found_count()),
        ("totalCount", records.total_count()),
        ("returnedCount", records.returned_count()),
    ];
    for (name, count) in counts {
        if let Some(count) = count {
            define_value(&array, &name.into(), &JsValue::from_f64(count as f64), false)?;
        }
    }

    Ok(array.into())
}

fn hide_identity(
    target: &JsValue,
    record_id: Option<&str>,
    mod_id: Option<&str>,
) -> Result<(), JsValue> {
    for (name, value) in [("recordId", record_id), ("modId", mod_id)] {
        if let Some(value) = value {
            define_value(target, &name.into(), &JsValue::from_str(value), false)?;
        }
    }
    Ok(())
}

fn define_value(
    target: &JsValue,
    key: &JsValue,
    value: &JsValue,
    enumerable: bool,
) -> Result<(), JsValue> {
    let target = target.clone().dyn_into::<Object>()?;
    let descriptor = Object::new();
    Reflect::set(&descriptor, &"value".into(), value)?;
    Reflect::set(&descriptor, &"writable".into(), &JsValue::TRUE)?;
    Reflect::set(&descriptor, &"configurable".into(), &JsValue::TRUE)?;
    Reflect::set(&descriptor, &"enumerable".into(), &JsValue::from_bool(enumerable))?;
    Object::define_property(&target, key, &descriptor);
    Ok(())
}

fn stringify(value: &JsValue) -> Result<String, JsValue> {
    JSON::stringify(value)?
        .as_string()
        .ok_or_else(|| js_sys::Error::new("value cannot be represented as JSON").into())
}

fn from_js<T>(value: &JsValue) -> Result<T, JsValue>
where
    T: serde::de::DeserializeOwned,
{
    let json = match present(value.clone()) {
        Some(value) => stringify(&value)?,
        None => "null".to_owned(),
    };
    serde_json::from_str(&json).map_err(|error| to_js_error(BridgeError::from(error)))
}

fn to_js<T>(value: &T) -> Result<JsValue, JsValue>
where
    T: serde::Serialize,
{
    let json = serde_json::to_string(value).map_err(|error| to_js_error(error.into()))?;
    JSON::parse(&json)
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|error| String::from(error.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn to_js_error(error: BridgeError) -> JsValue {
    let js_error = js_sys::Error::new(&error.to_string());
    let name = match &error {
        BridgeError::HostUnavailable { .. } => "HostUnavailableError",
        BridgeError::CallRejected { .. } => "CallRejectedError",
        BridgeError::MalformedEnvelope(_) => "MalformedEnvelopeError",
        BridgeError::Application { .. } => "ApplicationError",
        BridgeError::QueryFailed(_) => "QueryError",
        _ => "BridgeError",
    };
    js_error.set_name(name);

    let mut properties = Vec::new();
    match &error {
        BridgeError::CallRejected {
            call_id,
            code,
            detail,
            ..
        } => {
            properties.push(("callId", JsValue::from_f64(call_id.value() as f64)));
            if let Some(code) = code {
                properties.push(("code", JsValue::from_str(code)));
            }
            if let Some(detail) = detail {
                properties.push(("detail", to_js(detail).unwrap_or(JsValue::NULL)));
            }
        }
        BridgeError::Application { code, .. } => {
            properties.push(("code", JsValue::from_str(code)));
        }
        _ => (),
    }
    for (name, value) in properties {
        let _ = Reflect::set(&js_error, &name.into(), &value);
    }

    js_error.into()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::HostHandle;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn own_descriptor(key: &str) -> JsValue {
        Object::get_own_property_descriptor(&js_sys::global(), &JsValue::from_str(key))
    }

    #[wasm_bindgen_test]
    async fn it_hands_over_a_host_assigned_to_the_trapped_global() {
        let key = "TrappedHostAssigned";
        let global = js_sys::global();
        let (handle, installer) = HostHandle::<JsHost>::trap(Duration::from_secs(5));

        let trap = Trap::set(key, installer)
            .unwrap()
            .expect("the global is not defined yet");
        assert!(
            Reflect::get(&own_descriptor(key), &"set".into())
                .unwrap()
                .is_function()
        );

        let interface = Object::new();
        Reflect::set(&global, &key.into(), &interface).unwrap();

        let host = handle.acquire().await.unwrap();
        assert!(Object::is(&host.handle, &interface));

        // The accessor replaced itself with an ordinary data property
        let descriptor = own_descriptor(key);
        assert!(Reflect::get(&descriptor, &"set".into()).unwrap().is_undefined());
        assert!(Object::is(
            &Reflect::get(&descriptor, &"value".into()).unwrap(),
            &interface
        ));

        // Disposing after the host arrived leaves the host in place
        trap.dispose();
        assert!(Object::is(
            &Reflect::get(&global, &key.into()).unwrap(),
            &interface
        ));

        Reflect::delete_property(&global, &key.into()).unwrap();
    }

    #[wasm_bindgen_test]
    async fn it_installs_a_host_that_is_already_present() {
        let key = "TrappedHostPresent";
        let global = js_sys::global();
        let interface = Object::new();
        Reflect::set(&global, &key.into(), &interface).unwrap();

        let (handle, installer) = HostHandle::<JsHost>::trap(Duration::from_secs(5));
        assert!(Trap::set(key, installer).unwrap().is_none());

        let host = handle.acquire().await.unwrap();
        assert!(Object::is(&host.handle, &interface));

        Reflect::delete_property(&global, &key.into()).unwrap();
    }

    #[wasm_bindgen_test]
    fn it_removes_a_trap_nobody_sprung() {
        let key = "TrappedHostNeverAssigned";
        let global = js_sys::global();
        let (_handle, installer) = HostHandle::<JsHost>::trap(Duration::from_secs(5));

        let trap = Trap::set(key, installer)
            .unwrap()
            .expect("the global is not defined yet");
        assert!(Reflect::has(&global, &key.into()).unwrap());

        trap.dispose();
        assert!(!Reflect::has(&global, &key.into()).unwrap());
    }

    #[wasm_bindgen_test]
    fn it_parses_call_ids_from_numbers_and_text() {
        assert_eq!(parse_call_id(&JsValue::from_f64(7.0)), Some(CallId::from(7)));
        assert_eq!(parse_call_id(&JsValue::from_str(" 12 ")), Some(CallId::from(12)));
        assert_eq!(parse_call_id(&JsValue::from_f64(1.5)), None);
        assert_eq!(parse_call_id(&JsValue::UNDEFINED), None);
    }

    #[wasm_bindgen_test]
    fn it_hides_record_identity_from_enumeration() {
        let records = RecordSet::from_response(&serde_json::json!({
            "dataInfo": { "foundCount": 1 },
            "data": [{ "fieldData": { "a": 1 }, "portalData": {}, "recordId": "5", "modId": "1" }]
        }))
        .unwrap();

        let array = records_to_js(&records).unwrap();
        let record = Reflect::get_u32(&array, 0).unwrap();

        assert_eq!(stringify(&record).unwrap(), r#"{"a":1}"#);
        assert_eq!(
            Reflect::get(&record, &"recordId".into()).unwrap().as_string(),
            Some("5".into())
        );
        assert_eq!(
            Reflect::get(&array, &"foundCount".into()).unwrap().as_f64(),
            Some(1.0)
        );
    }
}
