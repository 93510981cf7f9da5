mod common;

#[cfg(test)]
mod interpreter_tests {
    use ay::value::{LuaString, Value};
    use ay::{Interpreter, InterpreterConfig};

    use super::common::{interpreter, run};

    #[test]
    fn test_interpreter_01_integer_wraparound() {
        let out = run(
            "local max = 9223372036854775807\n\
             local min = -max - 1\n\
             print(max + 1, max * 2, min - 1, min * -1)",
        );
        assert_eq!(
            out,
            "-9223372036854775808\t-2\t9223372036854775807\t-9223372036854775808\n"
        );
    }

    #[test]
    fn test_interpreter_02_equality_laws() {
        let out = run(
            "print(1 == 1.0, 0/0 == 0/0, {} == {})\n\
             local x = {}\n\
             print(x == x, x ~= x, 'a' == 'a')",
        );
        assert_eq!(out, "true\tfalse\tfalse\ntrue\tfalse\ttrue\n");
    }

    #[test]
    fn test_interpreter_03_multi_result_truncation() {
        let out = run(
            "local function f() return 100, 200, 300 end\n\
             local a = {f(), 5}\n\
             local b = {f()}\n\
             print(#a, a[1], a[2], #b, b[3], (f()))\n\
             local x, y, z, w = f()\n\
             print(x, y, z, w)",
        );
        assert_eq!(out, "2\t100\t5\t3\t300\t100\n100\t200\t300\tnil\n");
    }

    #[test]
    fn test_interpreter_04_closures_share_their_iteration_scope() {
        let out = run(
            "local fns = {}\n\
             for i = 1, 3 do\n\
               local x = i\n\
               local get = function() return x end\n\
               local set = function(v) x = v end\n\
               fns[i] = {get = get, set = set}\n\
             end\n\
             fns[1].set(10)\n\
             print(fns[1].get(), fns[2].get(), fns[3].get())",
        );
        assert_eq!(out, "10\t2\t3\n");
    }

    #[test]
    fn test_interpreter_05_redeclared_local_keeps_old_binding_for_closures() {
        let out = run(
            "local x = 1\n\
             local f = function() return x end\n\
             local x = 2\n\
             print(f(), x)",
        );
        assert_eq!(out, "1\t2\n");
    }

    #[test]
    fn test_interpreter_06_counter_closure() {
        let out = run(
            "local function counter()\n\
               local n = 0\n\
               return function() n = n + 1; return n end\n\
             end\n\
             local c1, c2 = counter(), counter()\n\
             c1(); c1()\n\
             print(c1(), c2())",
        );
        assert_eq!(out, "3\t1\n");
    }

    #[test]
    fn test_interpreter_07_numeric_for_stops_at_integer_limits() {
        let out = run(
            "local n = 0\n\
             for i = 9223372036854775806, 9223372036854775807 do n = n + 1 end\n\
             local m = 0\n\
             local min = -9223372036854775807 - 1\n\
             for i = min + 1, min, -1 do m = m + 1 end\n\
             print(n, m)",
        );
        assert_eq!(out, "2\t2\n");
    }

    #[test]
    fn test_interpreter_08_numeric_for_variants() {
        let out = run(
            "for i = 1, 2, 0.5 do print(i) end\n\
             for i = 3, 1, -1 do print(i) end\n\
             for i = 1, 0 do print('never') end\n\
             for i = 1, 2.9 do print(i) end",
        );
        assert_eq!(out, "1.0\n1.5\n2.0\n3\n2\n1\n1\n2\n");
    }

    #[test]
    fn test_interpreter_09_generic_for_with_pairs_and_ipairs() {
        let out = run(
            "local t = {10, 20, 30, nil, 50}\n\
             local sum = 0\n\
             for i, v in ipairs(t) do sum = sum + i * v end\n\
             print(sum)\n\
             local keys = 0\n\
             for k, v in pairs({a = 1, b = 2, 3}) do keys = keys + 1 end\n\
             print(keys)",
        );
        assert_eq!(out, "140\n3\n");
    }

    #[test]
    fn test_interpreter_10_while_repeat_break() {
        let out = run(
            "local i = 0\n\
             while true do\n\
               i = i + 1\n\
               if i > 3 then break end\n\
             end\n\
             local j = 0\n\
             repeat local k = j; j = j + 1 until k >= 2\n\
             print(i, j)",
        );
        assert_eq!(out, "4\t3\n");
    }

    #[test]
    fn test_interpreter_11_goto_continue_and_backward_jump() {
        let out = run(
            "for i = 1, 5 do\n\
               if i % 2 == 0 then goto continue end\n\
               print(i)\n\
               ::continue::\n\
             end\n\
             local i = 1\n\
             ::top::\n\
             if i <= 2 then print('loop', i); i = i + 1; goto top end",
        );
        assert_eq!(out, "1\n3\n5\nloop\t1\nloop\t2\n");
    }

    #[test]
    fn test_interpreter_12_goto_loop_creates_fresh_locals() {
        let out = run(
            "local fs = {}\n\
             local i = 1\n\
             ::again::\n\
             local x = i\n\
             fs[i] = function() return x end\n\
             i = i + 1\n\
             if i <= 3 then goto again end\n\
             print(fs[1](), fs[2](), fs[3]())",
        );
        assert_eq!(out, "1\t2\t3\n");
    }

    #[test]
    fn test_interpreter_13_to_be_closed_variables() {
        let out = run(
            "local function closer(name)\n\
               return setmetatable({}, {__close = function(_, err) print('close', name, err) end})\n\
             end\n\
             do\n\
               local a <close> = closer('a')\n\
               local b <close> = closer('b')\n\
               print('body')\n\
             end\n\
             while true do\n\
               local c <close> = closer('loop')\n\
               break\n\
             end\n\
             local ok, err = pcall(function()\n\
               local d <close> = closer('d')\n\
               error('boom', 0)\n\
             end)\n\
             print(ok, err)",
        );
        assert_eq!(
            out,
            "body\nclose\tb\tnil\nclose\ta\tnil\nclose\tloop\tnil\nclose\td\tboom\nfalse\tboom\n"
        );
    }

    #[test]
    fn test_interpreter_14_varargs_and_select() {
        let out = run(
            "local function count(...) return select('#', ...) end\n\
             local function pack(...) return {...} end\n\
             print(count(), count(nil, nil), #pack(1, 2, 3), select(2, 'a', 'b', 'c'))\n\
             print(select(-1, 'a', 'b', 'c'))\n\
             local function first(...) local a = ... return a end\n\
             print(first(7, 8))",
        );
        assert_eq!(out, "0\t2\t3\tb\tc\nc\n7\n");
    }

    #[test]
    fn test_interpreter_15_arithmetic_and_formatting() {
        let out = run(
            "print(7 // 2, -7 // 2, 7 % -3, 7.0 // 2, 1 / 2, 2 ^ 10)\n\
             print(100 / 2, 1e15, 1e100, 0.1, -0.0, 3 | 5, 6 & 3, 1 << 62, ~0)\n\
             print('10' + 1, '3.0' + 1, '0x10' * 1, 1 .. 2, 1.5 .. '')",
        );
        assert_eq!(
            out,
            "3\t-4\t-2\t3.0\t0.5\t1024.0\n\
             50.0\t1e+15\t1e+100\t0.1\t-0.0\t7\t2\t4611686018427387904\t-1\n\
             11\t4.0\t16\t12\t1.5\n"
        );
    }

    #[test]
    fn test_interpreter_16_exact_mixed_comparison() {
        let out = run(
            "print(9007199254740993 < 9007199254740992.0, 9007199254740993 > 9007199254740992.0)\n\
             print(1 < 1.5, 2 <= 2.0, 'a' < 'b', 'abc' < 'abd', 'Z' < 'a')",
        );
        assert_eq!(out, "false\ttrue\ntrue\ttrue\ttrue\ttrue\ttrue\n");
    }

    #[test]
    fn test_interpreter_17_methods_and_string_keys() {
        let out = run(
            "local account = {balance = 0}\n\
             function account:deposit(n) self.balance = self.balance + n; return self end\n\
             account:deposit(5):deposit(10)\n\
             local t = {}\n\
             t[1.0] = 'one'\n\
             print(account.balance, t[1], #t)",
        );
        assert_eq!(out, "15\tone\t1\n");
    }

    #[test]
    fn test_interpreter_18_table_constructor_key_order() {
        let out = run("local t = {[1] = 'keyed', 'positional'}\nprint(t[1])");
        assert_eq!(out, "positional\n");
    }

    #[test]
    fn test_interpreter_19_multiple_assignment_evaluates_before_storing() {
        let out = run(
            "local a, b = 1, 2\n\
             a, b = b, a\n\
             local t = {}\n\
             local i = 1\n\
             i, t[i] = i + 1, 'x'\n\
             print(a, b, i, t[1], t[2])",
        );
        assert_eq!(out, "2\t1\t2\tx\tnil\n");
    }

    #[test]
    fn test_interpreter_20_evaluate_expression_entry_point() {
        let (mut interp, _) = interpreter();
        let values = interp.eval_source("1 + 2, 'x', nil").expect("evaluates");
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Value::integer(3));
        assert_eq!(values[1], Value::String(LuaString::from("x")));
        assert!(values[2].is_nil());

        let values = interp.exec("return 1, 2").expect("runs");
        assert_eq!(values, vec![Value::integer(1), Value::integer(2)]);
    }

    #[test]
    fn test_interpreter_21_host_registered_functions() {
        let (mut interp, output) = interpreter();
        interp.register("double", |_, args| {
            let n = match args.first() {
                Some(Value::Number(n)) => n.to_float(),
                _ => 0.0,
            };
            Ok(vec![Value::float(n * 2.0)])
        });
        interp.exec("print(double(21))").expect("runs");
        assert_eq!(output.contents(), "42.0\n");

        let func = interp.load("return ...", "host").expect("loads");
        let values = interp
            .call_function(&func, vec![Value::integer(1), Value::Boolean(true)])
            .expect("calls");
        assert_eq!(values, vec![Value::integer(1), Value::Boolean(true)]);
    }

    #[test]
    fn test_interpreter_22_globals_are_visible_to_the_host() {
        let (mut interp, _) = interpreter();
        interp.exec("answer = 6 * 7").expect("runs");
        let answer = interp.globals().borrow().get_str("answer");
        assert_eq!(answer, Value::integer(42));
    }

    #[test]
    fn test_interpreter_23_cyclic_table_renders() {
        let (mut interp, _) = interpreter();
        interp.exec("t = {name = 'loop'}\nt.self = t").expect("runs");
        let t = interp.globals().borrow().get_str("t");
        let rendered = t.repr();
        assert!(rendered.starts_with('{'), "got {}", rendered);
        assert!(rendered.contains("<cycle table: "), "got {}", rendered);
        assert!(rendered.contains("\"loop\""), "got {}", rendered);
    }

    #[test]
    fn test_interpreter_24_deep_recursion_within_the_limit() {
        let config = InterpreterConfig::default().with_max_call_depth(5000);
        let mut interp = Interpreter::with_config(config);
        let values = interp
            .exec(
                "local function depth(n) if n == 0 then return 0 end return 1 + depth(n - 1) end\n\
                 return depth(4000)",
            )
            .expect("runs");
        assert_eq!(values, vec![Value::integer(4000)]);
    }

    #[test]
    fn test_interpreter_25_long_expression_chains() {
        let source = format!("x = 1{}\nprint(x)", " + 1".repeat(100_000));
        assert_eq!(run(&source), "100001\n");

        let source = format!("local t = {{v = 0}}\nlocal n = 0{}\nprint(n)", " - t.v".repeat(50_000));
        assert_eq!(run(&source), "0\n");
    }
}
