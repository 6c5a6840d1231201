//! The canonical conformance scenarios the harness exercises a server
//! with: the stateful registration-cache walk, the OPTIONS capability
//! probe, and the unknown-method fault on the control channel.

use crate::config::RegisterCacheTiming;
use crate::matcher::ResponsePattern;
use crate::runner::Scenario;
use crate::sip::{ContactExpectation, SipMethod, SipRequest};
use crate::Result;

const REQUEST_URI: &str = "sip:127.0.0.1";
const AOR_URI: &str = "sip:monitoring@127.0.0.1";
const FROM_DISPLAY: &str = "monit";
const FROM_URI: &str = "sip:monit@127.0.0.1";
const FROM_TAG: &str = "5c21da0f77b3e9a4";

/// Dialog identifiers for the registration-cache walk. Distinct values
/// prove that bindings and removals do not leak across dialogs.
const CALL_ID_PRIMARY: &str = "9f30c2ab51d6e874";
const CALL_ID_SECONDARY: &str = "9f30c2ab51d6ffe0";
const CALL_ID_REMOVAL: &str = "9f30c2ab7724";

/// Contact the harness registers, and the form the registrar reports it
/// back in (transport annotation appended).
const CONTACT_URI: &str = "sip:127.0.0.1:56201";
const REPORTED_CONTACT: &str = "sip:127.0.0.1:56201;transport=udp";

const CSEQ_BASE: u32 = 20731;

fn register(call_id: &str, cseq: u32) -> SipRequest {
    SipRequest::new(SipMethod::Register, REQUEST_URI)
        .to_uri(AOR_URI)
        .from_party(FROM_DISPLAY, FROM_URI, FROM_TAG)
        .call_id(call_id)
        .cseq(cseq)
}

/// Accepted remaining-lifetime values right after a registration: the
/// full lifetime, or one second less if the clock ticked in between.
fn fresh_lifetimes(lifetime_secs: u32) -> Vec<String> {
    vec![
        lifetime_secs.saturating_sub(1).to_string(),
        lifetime_secs.to_string(),
    ]
}

/// The registration-cache walk: observes the externally visible life of
/// a binding purely through REGISTER exchanges on one long-lived socket.
/// The binding starts absent, is created with a finite lifetime, expires,
/// gets swept by the server's garbage collector, is re-created under a
/// second dialog, and is finally removed by a wildcard unregistration.
pub fn register_cache(timing: &RegisterCacheTiming) -> Result<Scenario> {
    let lifetimes = fresh_lifetimes(timing.lifetime_secs);

    // query the empty binding store
    let query = register(CALL_ID_PRIMARY, CSEQ_BASE);
    let expect_empty = query.expect_ok().compile()?;
    let scenario = Scenario::new("register-cache").sip_dialog("query empty store", query, expect_empty);

    // create a binding with a finite lifetime
    let create = register(CALL_ID_PRIMARY, CSEQ_BASE + 1)
        .contact(CONTACT_URI)
        .expires(timing.lifetime_secs);
    let expect_created = create
        .expect_ok()
        .with_contact(ContactExpectation {
            uri: REPORTED_CONTACT.into(),
            bracketed: true,
            expires_any_of: lifetimes.clone(),
        })
        .compile()?;
    let scenario = scenario
        .sip_dialog("create binding", create, expect_created)
        // let the lifetime elapse
        .pause(timing.expiry_wait);

    // the binding must be gone after expiry
    let query = register(CALL_ID_PRIMARY, CSEQ_BASE + 2);
    let expect_gone = query.expect_ok().compile()?;
    let scenario = scenario
        .sip_dialog("query after expiry", query, expect_gone)
        // ...and stay gone past the garbage-collection sweep
        .pause(timing.gc_wait);

    let query = register(CALL_ID_PRIMARY, CSEQ_BASE + 3);
    let expect_still_gone = query.expect_ok().compile()?;
    let scenario = scenario.sip_dialog("query after gc sweep", query, expect_still_gone);

    // a second dialog creates its own binding; the first one's absence
    // persists, and a query now reports only the new contact
    let refresh = register(CALL_ID_SECONDARY, CSEQ_BASE + 4)
        .contact(CONTACT_URI)
        .expires(timing.lifetime_secs);
    let expect_refreshed = refresh
        .expect_ok()
        .with_contact(ContactExpectation {
            uri: REPORTED_CONTACT.into(),
            bracketed: true,
            expires_any_of: lifetimes.clone(),
        })
        .compile()?;
    let scenario = scenario.sip_dialog("create second binding", refresh, expect_refreshed);

    let query = register(CALL_ID_PRIMARY, CSEQ_BASE + 5);
    // Queries report the binding without angle brackets.
    let expect_visible = query
        .expect_ok()
        .with_contact(ContactExpectation {
            uri: REPORTED_CONTACT.into(),
            bracketed: false,
            expires_any_of: lifetimes,
        })
        .compile()?;
    let scenario = scenario.sip_dialog("query second binding", query, expect_visible);

    // wildcard-target, zero-lifetime removal under yet another dialog
    let remove = register(CALL_ID_REMOVAL, CSEQ_BASE + 6)
        .contact_wildcard()
        .expires(0);
    let expect_removed = remove.expect_ok().compile()?;
    let scenario = scenario.sip_dialog("remove all bindings", remove, expect_removed);

    // permanent absence
    let query = register(CALL_ID_PRIMARY, CSEQ_BASE + 7);
    let expect_absent = query.expect_ok().compile()?;
    Ok(scenario.sip_dialog("query after removal", query, expect_absent))
}

/// Unauthenticated capability probe: OPTIONS to a monitoring target must
/// come back 200 with the routing and correlation headers echoed, a
/// server-assigned To tag, a received-address annotation on the Via, and
/// no body.
pub fn options_probe(target_domain: &str) -> Result<Scenario> {
    let target = format!("sip:monitoring@{target_domain}");
    let probe = SipRequest::new(SipMethod::Options, &target)
        .to_uri(&target)
        .from_party(FROM_DISPLAY, FROM_URI, FROM_TAG)
        .call_id(CALL_ID_PRIMARY)
        .cseq(CSEQ_BASE)
        .contact(CONTACT_URI)
        .accept("application/sdp");
    let expect = probe.expect_ok().compile()?;
    Ok(Scenario::new("options-probe").sip("capability probe", probe, expect))
}

/// Control-channel fault shape: invoking an unregistered method must
/// return the fixed success envelope and an XML-RPC fault naming the
/// method with fault code -1.
pub fn unknown_control_method(method_name: &str) -> Result<Scenario> {
    let body = format!(
        "<?xml version=\"1.0\"?>\n\
         \x20 <methodCall>\n\
         \x20   <methodName>{method_name}</methodName>\n\
         \x20   <params>\n\
         \x20     <param>\n\
         \x20       <value><string>audio</string></value>\n\
         \x20     </param>\n\
         \x20   </params>\n\
         \x20 </methodCall>"
    );

    let expect = ResponsePattern::builder()
        .lit_line("<?xml version=\"1.0\"?>")
        .lit_line("<methodResponse><fault>")
        .lit_line(format!(
            "\t<value><struct><member><name>faultCode</name><value><i4>-1</i4></value></member>\
             <member><name>faultString</name><value>{method_name}: unknown method name</value>\
             </member></struct></value>"
        ))
        .lit_line("</fault></methodResponse>")
        .compile()?;

    Ok(Scenario::new("unknown-control-method").control("unknown method fault", body, expect))
}
