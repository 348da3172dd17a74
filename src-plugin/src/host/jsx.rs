//! Host script builders.
//!
//! Every request to the host is a script in its extension language. The
//! value of the script's last expression comes back as the reply.

/// Quote `value` as a script string literal.
fn literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Register a Generator menu item.
pub fn menu_initialize(id: &str, label: &str, enabled: bool, checked: bool) -> String {
    format!(
        "var desc = new ActionDescriptor();\
         desc.putString(stringIDToTypeID(\"name\"), {id});\
         desc.putString(stringIDToTypeID(\"displayName\"), {label});\
         desc.putBoolean(stringIDToTypeID(\"enabled\"), {enabled});\
         desc.putBoolean(stringIDToTypeID(\"checked\"), {checked});\
         executeAction(stringIDToTypeID(\"nodeMenuInitialize\"), desc, DialogModes.NO);",
        id = literal(id),
        label = literal(label),
    )
}

/// Ask the host to push `event` notifications to this client.
pub fn event_subscribe(event: &str) -> String {
    format!(
        "var desc = new ActionDescriptor();\
         desc.putClass(stringIDToTypeID(\"eventIDAttr\"), stringIDToTypeID({event}));\
         executeAction(stringIDToTypeID(\"networkEventSubscribe\"), desc, DialogModes.NO);",
        event = literal(event),
    )
}

/// Fetch document metadata as JSON. `None` selects the active document.
pub fn document_info(document_id: Option<u32>) -> String {
    let select = match document_id {
        Some(id) => format!("desc.putInteger(stringIDToTypeID(\"documentID\"), {});", id),
        None => String::new(),
    };
    format!(
        "var desc = new ActionDescriptor();\
         {select}\
         desc.putBoolean(stringIDToTypeID(\"getTextStyles\"), false);\
         desc.putBoolean(stringIDToTypeID(\"expandSmartObjects\"), false);\
         executeActionGet(stringIDToTypeID(\"sendDocumentInfoToNetworkClient\"), desc).getString(stringIDToTypeID(\"json\"));"
    )
}

/// Stream a flattened thumbnail of the active document as a pixmap (format 2)
/// and reply with `width,height` after forcing ruler units to pixels.
pub fn document_thumbnail() -> String {
    "var idNS = stringIDToTypeID(\"sendDocumentThumbnailToNetworkClient\");\
     var desc = new ActionDescriptor();\
     desc.putInteger(stringIDToTypeID(\"width\"), app.activeDocument.width);\
     desc.putInteger(stringIDToTypeID(\"height\"), app.activeDocument.height);\
     desc.putInteger(stringIDToTypeID(\"format\"), 2);\
     executeAction(idNS, desc, DialogModes.NO);\
     app.preferences.rulerUnits = Units.PIXELS;\
     app.activeDocument.width + \",\" + app.activeDocument.height;"
        .to_string()
}

/// Stream one layer as an ARGB pixmap.
pub fn layer_thumbnail(document_id: u32, layer_id: u32) -> String {
    format!(
        "var desc = new ActionDescriptor();\
         desc.putInteger(stringIDToTypeID(\"documentID\"), {document_id});\
         desc.putInteger(stringIDToTypeID(\"layerID\"), {layer_id});\
         desc.putInteger(stringIDToTypeID(\"format\"), 2);\
         desc.putDouble(stringIDToTypeID(\"scale\"), 1);\
         executeAction(stringIDToTypeID(\"sendLayerThumbnailToNetworkClient\"), desc, DialogModes.NO);"
    )
}
