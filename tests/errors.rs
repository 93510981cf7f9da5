mod common;

#[cfg(test)]
mod error_tests {
    use ay::{Interpreter, InterpreterConfig, LuaError, Value};

    use super::common::{error_message, run, run_err};

    fn static_error(source: &str) -> String {
        match run_err(source) {
            LuaError::Resolve { message, .. }
            | LuaError::Parse { message, .. }
            | LuaError::Lex { message, .. } => message,
            other => panic!("expected a static error, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_01_variable_descriptions() {
        assert_eq!(
            error_message("local t = nil\nlocal x = t.field"),
            "input:2: attempt to index a nil value (local 't')"
        );
        assert_eq!(
            error_message("x = undefined_global + 1"),
            "input:1: attempt to perform arithmetic on a nil value (global 'undefined_global')"
        );
        assert_eq!(
            error_message("local t = {}\nt.a.b = 1"),
            "input:2: attempt to index a nil value (field 'a')"
        );
        assert_eq!(
            error_message("local f\nf()"),
            "input:2: attempt to call a nil value (local 'f')"
        );
        assert_eq!(
            error_message("local s = {}\ns:nope()"),
            "input:2: attempt to call a nil value (method 'nope')"
        );
        assert_eq!(
            error_message("local u\nlocal function g() return u.x end\ng()"),
            "input:2: attempt to index a nil value (upvalue 'u')"
        );
        assert_eq!(
            error_message("local t = {}\nprint('a' .. t)"),
            "input:2: attempt to concatenate a table value (local 't')"
        );
        assert_eq!(
            error_message("local n\nreturn #n"),
            "input:2: attempt to get length of a nil value (local 'n')"
        );
    }

    #[test]
    fn test_errors_02_operator_errors() {
        assert_eq!(
            error_message("print(1 < 'x')"),
            "input:1: attempt to compare number with string"
        );
        assert_eq!(
            error_message("print({} < {})"),
            "input:1: attempt to compare two table values"
        );
        assert_eq!(error_message("print(1 // 0)"), "input:1: attempt to perform 'n//0'");
        assert_eq!(error_message("print(1 % 0)"), "input:1: attempt to perform 'n%0'");
        assert_eq!(
            error_message("print(1.5 | 0)"),
            "input:1: number has no integer representation"
        );
        assert_eq!(
            error_message("print({} | 1)"),
            "input:1: attempt to perform bitwise operation on a table value"
        );
        assert_eq!(run("print(1 / 0, -1 / 0, 1.0 // 0)"), "inf\t-inf\tinf\n");
    }

    #[test]
    fn test_errors_03_loop_and_table_errors() {
        assert_eq!(error_message("for i = 1, 10, 0 do end"), "input:1: 'for' step is zero");
        assert_eq!(
            error_message("for i = 'a', 2 do end"),
            "input:1: 'for' initial value must be a number"
        );
        assert_eq!(
            error_message("for i = 1, {} do end"),
            "input:1: 'for' limit must be a number"
        );
        assert_eq!(
            error_message("local t = {}\nt[nil] = 1"),
            "input:2: table index is nil"
        );
        assert_eq!(
            error_message("local x <close> = 42"),
            "input:1: variable 'x' got a non-closable value"
        );
    }

    #[test]
    fn test_errors_04_error_levels() {
        let out = run(
            "local function check(x)\n\
               if not x then error('bad input', 2) end\n\
             end\n\
             local function caller()\n\
               check(false)\n\
             end\n\
             print(select(2, pcall(caller)))\n\
             print(select(2, pcall(error, 'plain')))\n\
             print(select(2, pcall(function() error('here') end)))\n\
             print(select(2, pcall(function() error('nowhere', 0) end)))",
        );
        assert_eq!(
            out,
            "input:5: bad input\nplain\ninput:9: here\nnowhere\n"
        );
    }

    #[test]
    fn test_errors_05_error_values_survive_pcall() {
        let out = run(
            "local ok, err = pcall(error, {code = 42})\n\
             print(ok, type(err), err.code)\n\
             print(pcall(function() return 1, 2 end))\n\
             print(xpcall(function() error('e', 0) end, function(m) return 'handled: ' .. m end))\n\
             print(xpcall(function() return 'fine' end, print))",
        );
        assert_eq!(
            out,
            "false\ttable\t42\ntrue\t1\t2\nfalse\thandled: e\ntrue\tfine\n"
        );
    }

    #[test]
    fn test_errors_06_assert() {
        assert_eq!(error_message("assert(false)"), "input:1: assertion failed!");
        assert_eq!(error_message("assert(nil, 'custom')"), "custom");
        assert_eq!(run("print(assert(1, 'unused'))"), "1\tunused\n");
    }

    #[test]
    fn test_errors_07_uncaught_error_has_traceback() {
        let err = run_err(
            "local function inner() error('deep') end\n\
             local function outer() inner() end\n\
             outer()",
        );
        match err {
            LuaError::Runtime(e) => {
                assert_eq!(e.to_string(), "input:1: deep");
                let report = e.report();
                assert!(report.contains("stack traceback:"), "got {}", report);
                assert!(report.contains("in function 'inner'"), "got {}", report);
                assert!(report.contains("input:3: in function 'outer'"), "got {}", report);
                assert!(report.contains("in main chunk"), "got {}", report);
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_08_stack_overflow_is_not_catchable() {
        let config = InterpreterConfig::default().with_max_call_depth(100);
        let mut interp = Interpreter::with_config(config);
        let result = interp.exec(
            "local function f() return f() + 1 end\n\
             return pcall(f)",
        );
        assert!(
            matches!(result, Err(LuaError::StackOverflow { depth: 100 })),
            "got {:?}",
            result
        );
    }

    #[test]
    fn test_errors_09_static_checks() {
        assert_eq!(
            static_error("goto nowhere"),
            "no visible label 'nowhere' for goto at line 1"
        );
        assert_eq!(static_error("break"), "break outside a loop at line 1");
        assert_eq!(
            static_error("local x <const> = 1\nx = 2"),
            "attempt to assign to const variable 'x'"
        );
        assert_eq!(
            static_error("local a <close>, b <close> = nil, nil"),
            "multiple to-be-closed variables in local list"
        );
        assert_eq!(static_error("local a <weird> = 1"), "unknown attribute 'weird'");
        assert_eq!(
            static_error("function f() return ... end"),
            "cannot use '...' outside a vararg function near '...'"
        );
        assert_eq!(
            static_error("::a:: ::a::"),
            "label 'a' already defined on line 1"
        );
        assert_eq!(
            static_error("goto skip\nlocal x = 1\n::skip::\nprint(x)"),
            "<goto skip> at line 1 jumps into the scope of local 'x'"
        );
    }

    #[test]
    fn test_errors_10_lexical_errors_surface_from_exec() {
        assert!(matches!(run_err("x = \"unfinished"), LuaError::Lex { .. }));
        assert!(matches!(run_err("x = = 1"), LuaError::Parse { .. }));
    }

    #[test]
    fn test_errors_11_host_sees_error_values() {
        let mut interp = Interpreter::new();
        match interp.exec("error({reason = 'custom'})") {
            Err(LuaError::Runtime(e)) => {
                let reason = match &e.value {
                    Value::Table(t) => t.borrow().get_str("reason"),
                    other => panic!("expected a table, got {:?}", other),
                };
                assert_eq!(reason, Value::from("custom"));
                assert_eq!(e.to_string(), "(error object is a table value)");
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }
}
