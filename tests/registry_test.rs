use script_bridge::config::StartupConfig;
use script_bridge::core::{Engine, ProtocolViolation};
use script_bridge::dispatch::Isolate;
use script_bridge::handlers::{CommandRegistry, Completions, ExitStatus, FsModuleResolver};
use script_bridge::protocol::{EnvelopeError, Envelope, Exit, MessageType};
use script_bridge::BridgeError;
use std::fs;
use std::path::Path;

fn bootstrap(root: &Path, argv: &[&str]) -> (Isolate, Completions, ExitStatus) {
    let startup = StartupConfig::new(
        root.to_string_lossy().into_owned(),
        argv.iter().map(|s| s.to_string()).collect(),
    );
    let registry = CommandRegistry::new(startup, Box::new(FsModuleResolver::new(root)));
    let completions = registry.completions();
    let exit_status = registry.exit_status();
    let snapshot = Engine::bootstrap_snapshot();
    let isolate = Isolate::new(Some(&snapshot), Some(Box::new(registry))).unwrap();
    (isolate, completions, exit_status)
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap()
}

fn protocol_violation(err: BridgeError) -> ProtocolViolation {
    match err {
        BridgeError::Protocol(violation) => violation,
        other => panic!("expected a protocol violation, got {:?}", other),
    }
}

#[test]
fn start_round_trip_through_script_codec() {
    let (mut isolate, _, _) = bootstrap(Path::new("/work/dir"), &["bridge", "main.js", "ünï ✓"]);
    isolate
        .execute(
            "start.js",
            r#"
            const { encode, decode, Type } = bridgeCodec;
            const env = decode(bridge.send(encode(1, Type.Start, {})));
            if (env.type !== Type.StartRes) throw Error("type " + env.type);
            if (env.commandId !== 1) throw Error("command id " + env.commandId);
            if (env.error !== null) throw Error("error " + env.error);
            if (env.message.cwd !== "/work/dir") throw Error("cwd " + env.message.cwd);
            if (env.message.argv.join("|") !== "bridge|main.js|ünï ✓") {
                throw Error("argv " + env.message.argv.join("|"));
            }
            "#,
        )
        .unwrap();
}

#[test]
fn zero_command_id_gets_no_response() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    isolate
        .execute(
            "start.js",
            r#"
            const r = bridge.send(bridgeCodec.encode(0, bridgeCodec.Type.Start, {}));
            if (r !== undefined) throw Error("unexpected response");
            "#,
        )
        .unwrap();
}

#[test]
fn none_tag_is_fatal_even_when_caught() {
    for _ in 0..2 {
        let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
        let err = isolate
            .execute(
                "none.js",
                r#"
                try {
                    bridge.send(bridgeCodec.encode(1, bridgeCodec.Type.NONE, {}));
                } catch (e) {}
                "#,
            )
            .unwrap_err();
        assert_eq!(
            protocol_violation(err),
            ProtocolViolation::NoneType { command_id: 1 }
        );
    }
}

#[test]
fn commands_after_violation_are_not_dispatched() {
    let (mut isolate, _, exit_status) = bootstrap(Path::new("/"), &["bridge"]);
    let err = isolate
        .execute(
            "halt.js",
            r#"
            try {
                bridge.send(bridgeCodec.encode(1, bridgeCodec.Type.NONE, {}));
            } catch (e) {}
            var halted = false;
            try {
                exit(5);
            } catch (e) {
                halted = true;
            }
            if (!halted) throw Error("exit ran after a violation");
            "#,
        )
        .unwrap_err();
    assert_eq!(
        protocol_violation(err),
        ProtocolViolation::NoneType { command_id: 1 }
    );
    assert_eq!(exit_status.get(), None);

    // 违规只作用于发生它的那次调用
    isolate.execute("exit.js", "exit(6);").unwrap();
    assert_eq!(exit_status.get(), Some(6));
}

#[test]
fn garbage_is_unverifiable() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    let err = isolate
        .execute("garbage.js", "bridge.send(new Uint8Array([1, 2, 3]));")
        .unwrap_err();
    assert_eq!(
        protocol_violation(err),
        ProtocolViolation::Unverifiable(EnvelopeError::Truncated { len: 3 })
    );
}

#[test]
fn wrong_declared_length_is_unverifiable() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    let err = isolate
        .execute(
            "length.js",
            r#"
            const bytes = bridgeCodec.encode(2, bridgeCodec.Type.Start, {});
            bytes[0] += 1;
            bridge.send(bytes);
            "#,
        )
        .unwrap_err();
    assert!(matches!(
        protocol_violation(err),
        ProtocolViolation::Unverifiable(EnvelopeError::LengthMismatch { .. })
    ));
}

#[test]
fn out_of_range_tag_is_unverifiable() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    let err = isolate
        .execute(
            "tag.js",
            r#"
            const bytes = bridgeCodec.encode(2, bridgeCodec.Type.Start, {});
            bytes[6] = 200;
            bridge.send(bytes);
            "#,
        )
        .unwrap_err();
    assert_eq!(
        protocol_violation(err),
        ProtocolViolation::Unverifiable(EnvelopeError::UnknownType(200))
    );
}

#[test]
fn response_kind_from_script_is_fatal() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    let err = isolate
        .execute(
            "res.js",
            r#"
            bridge.send(bridgeCodec.encode(4, bridgeCodec.Type.StartRes, { cwd: "/", argv: [] }));
            "#,
        )
        .unwrap_err();
    assert_eq!(
        protocol_violation(err),
        ProtocolViolation::UnexpectedMessage {
            command_id: 4,
            message_type: MessageType::StartRes,
        }
    );
}

#[test]
fn exit_records_code() {
    let (mut isolate, _, exit_status) = bootstrap(Path::new("/"), &["bridge"]);
    isolate.execute("exit.js", "exit(-2);").unwrap();
    assert_eq!(exit_status.get(), Some(-2));
}

#[test]
fn host_envelope_decodes_in_script() {
    let (mut isolate, _, _) = bootstrap(Path::new("/"), &["bridge"]);
    isolate
        .execute(
            "recv.js",
            r#"
            var received = null;
            bridge.recv(msg => { received = bridgeCodec.decode(msg); });
            "#,
        )
        .unwrap();

    let message = Envelope::new(3, Exit { code: -7 }).to_buffer().unwrap();
    assert!(isolate.send(message).unwrap().is_none());

    isolate
        .execute(
            "check.js",
            r#"
            if (received.commandId !== 3) throw Error("command id");
            if (received.type !== bridgeCodec.Type.Exit) throw Error("type");
            if (received.message.code !== -7) throw Error("code " + received.message.code);
            "#,
        )
        .unwrap();
}

#[test]
fn code_fetch_completes_on_a_later_delivery() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("mod.js"), "var loaded = 'yes';").unwrap();
    let containing = dir.path().join("main.js");

    let (mut isolate, completions, _) = bootstrap(dir.path(), &["bridge"]);
    let script = format!(
        r#"
        var fetched = null;
        bridge.recv(msg => {{ fetched = bridgeCodec.decode(msg); }});
        const r = bridge.send(bridgeCodec.encode(7, bridgeCodec.Type.CodeFetch, {{
            moduleSpecifier: "./mod.js",
            containingFile: {},
        }}));
        if (r !== undefined) throw Error("CodeFetch answered synchronously");
        "#,
        js_string(&containing.to_string_lossy())
    );
    isolate.execute("fetch.js", &script).unwrap();
    assert_eq!(completions.len(), 1);

    let delivered = Engine::drain_completions(&mut isolate, &completions).unwrap();
    assert_eq!(delivered, 1);
    assert!(completions.is_empty());

    isolate
        .execute(
            "check.js",
            r#"
            if (fetched.commandId !== 7) throw Error("command id");
            if (fetched.type !== bridgeCodec.Type.CodeFetchRes) throw Error("type");
            if (fetched.error !== null) throw Error(fetched.error);
            if (fetched.message.sourceCode !== "var loaded = 'yes';") throw Error("source");
            if (!fetched.message.filename.endsWith("mod.js")) throw Error("filename");
            "#,
        )
        .unwrap();
}

#[test]
fn failed_code_fetch_carries_error_text() {
    let dir = tempfile::tempdir().unwrap();
    let (mut isolate, completions, _) = bootstrap(dir.path(), &["bridge"]);
    isolate
        .execute(
            "fetch.js",
            r#"
            var fetched = null;
            bridge.recv(msg => { fetched = bridgeCodec.decode(msg); });
            bridge.send(bridgeCodec.encode(8, bridgeCodec.Type.CodeFetch, {
                moduleSpecifier: "missing",
                containingFile: "",
            }));
            "#,
        )
        .unwrap();

    let deferred = completions.pop().unwrap();
    let envelope = Envelope::decode(&deferred).unwrap();
    assert_eq!(envelope.command_id, 8);
    assert!(envelope.error.as_deref().unwrap().contains("missing"));

    isolate.send(deferred).unwrap();
    isolate
        .execute(
            "check.js",
            "if (fetched.error === null || fetched.error.indexOf('missing') < 0) throw Error('error');",
        )
        .unwrap();
}
