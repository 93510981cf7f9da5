mod common;

#[cfg(test)]
mod library_tests {
    use super::common::{error_message, run};

    #[test]
    fn test_library_01_type_and_tostring() {
        let out = run(
            "print(type(nil), type(true), type(1), type('s'), type({}), type(print))\n\
             print(tostring(nil), tostring(1.5), tostring(10), tostring(false))\n\
             print(_VERSION, _G == _G._G, _G.print == print)",
        );
        assert_eq!(
            out,
            "nil\tboolean\tnumber\tstring\ttable\tfunction\n\
             nil\t1.5\t10\tfalse\n\
             Lua 5.4\ttrue\ttrue\n"
        );
    }

    #[test]
    fn test_library_02_tonumber() {
        let out = run(
            "print(tonumber('42'), tonumber(' 0x1F '), tonumber('1e2'), tonumber('abc'), tonumber(7))\n\
             print(tonumber('ff', 16), tonumber('-101', 2), tonumber('zz', 36), tonumber('9', 8))",
        );
        assert_eq!(out, "42\t31\t100.0\tnil\t7\n255\t-5\t1295\tnil\n");
    }

    #[test]
    fn test_library_03_tonumber_argument_errors() {
        assert_eq!(
            error_message("tonumber('10', 99)"),
            "input:1: bad argument #2 to 'tonumber' (base out of range)"
        );
        assert_eq!(
            error_message("tonumber()"),
            "input:1: bad argument #1 to 'tonumber' (value expected)"
        );
    }

    #[test]
    fn test_library_04_raw_access() {
        let out = run(
            "local t = setmetatable({}, {__index = function() return 'meta' end, __len = function() return 0 end})\n\
             rawset(t, 'k', 'v')\n\
             t[1] = 'a'; t[2] = 'b'\n\
             print(t.missing, rawget(t, 'missing'), rawget(t, 'k'), #t, rawlen(t), rawlen('abc'))",
        );
        assert_eq!(out, "meta\tnil\tv\t0\t2\t3\n");
    }

    #[test]
    fn test_library_05_next_and_pairs_visit_every_entry() {
        let out = run(
            "local t = {1, 2, 3, x = 4, y = 5}\n\
             local count, sum = 0, 0\n\
             local k, v = next(t)\n\
             while k ~= nil do\n\
               count = count + 1; sum = sum + v\n\
               k, v = next(t, k)\n\
             end\n\
             print(count, sum, next({}))\n\
             for key in pairs(t) do t[key] = nil end\n\
             print(next(t))",
        );
        assert_eq!(out, "5\t15\tnil\nnil\n");
    }

    #[test]
    fn test_library_06_select_errors() {
        assert_eq!(
            error_message("select(-5, 'a')"),
            "input:1: bad argument #1 to 'select' (index out of range)"
        );
        assert_eq!(run("print(select(5, 'a'))"), "\n");
    }

    #[test]
    fn test_library_07_setmetatable_argument_checks() {
        assert_eq!(
            error_message("setmetatable(1, {})"),
            "input:1: bad argument #1 to 'setmetatable' (table expected, got number)"
        );
        assert_eq!(
            error_message("setmetatable({}, 1)"),
            "input:1: bad argument #2 to 'setmetatable' (nil or table expected, got number)"
        );
        assert_eq!(run("print(getmetatable(setmetatable({}, nil)))"), "nil\n");
    }

    #[test]
    fn test_library_08_load() {
        let out = run(
            "local f = load('return 1 + ...')\n\
             print(f(41))\n\
             local g, err = load('return +', '=snippet')\n\
             print(g, err)\n\
             local env = {x = 'from env'}\n\
             local h = load('return x', 'chunk', 't', env)\n\
             print(h())\n\
             local parts = {'return ', '\"pieces\"'}\n\
             local i = 0\n\
             local r = load(function() i = i + 1; return parts[i] end)\n\
             print(r())",
        );
        assert_eq!(
            out,
            "42\nnil\tsnippet:1: unexpected symbol near '+'\nfrom env\npieces\n"
        );
    }

    #[test]
    fn test_library_09_load_chunk_names_in_errors() {
        let out = run(
            "local f = load('error(\"inside\")')\n\
             print(pcall(f))\n\
             local g = load('error(\"named\")', '@file.lua')\n\
             print(pcall(g))",
        );
        assert_eq!(
            out,
            "false\t[string \"error(\"inside\")\"]:1: inside\nfalse\tfile.lua:1: named\n"
        );
    }

    #[test]
    fn test_library_10_collectgarbage_and_warn() {
        let out = run(
            "print(collectgarbage(), collectgarbage('count'), collectgarbage('isrunning'))\n\
             warn('@on')\n\
             warn('@off')\n\
             print(pcall(collectgarbage, 'bogus'))",
        );
        assert_eq!(
            out,
            "0\t0.0\ttrue\nfalse\tbad argument #1 to 'collectgarbage' (invalid option 'bogus')\n"
        );
        assert_eq!(
            error_message("warn(1, {})"),
            "input:1: bad argument #2 to 'warn' (string expected, got table)"
        );
    }

    #[test]
    fn test_library_11_print_uses_tostring_metamethods() {
        let out = run(
            "local p = setmetatable({}, {__tostring = function() return 'P' end})\n\
             print(p, 1, nil, 'x')",
        );
        assert_eq!(out, "P\t1\tnil\tx\n");
    }

    #[test]
    fn test_library_12_ipairs_respects_index_metamethod() {
        let out = run(
            "local backing = {'a', 'b', 'c'}\n\
             local proxy = setmetatable({}, {__index = backing})\n\
             local seen = ''\n\
             for i, v in ipairs(proxy) do seen = seen .. i .. v end\n\
             print(seen)",
        );
        assert_eq!(out, "1a2b3c\n");
    }

    #[test]
    fn test_library_13_pairs_ignores_keys_added_mid_loop() {
        let out = run(
            "local t = {a = 1}\n\
             local n = 0\n\
             for k in pairs(t) do\n\
               n = n + 1\n\
               if n < 5 then t['k' .. n] = true end\n\
             end\n\
             print(n)\n\
             local u = {}\n\
             for i = 1, 10 do u['x' .. i] = i end\n\
             local visited = 0\n\
             for k in pairs(u) do\n\
               visited = visited + 1\n\
               u[k] = nil\n\
               u['y' .. visited] = visited\n\
             end\n\
             print(visited, u.x1, u.y10)",
        );
        assert_eq!(out, "1\n10\tnil\t10\n");
    }

    #[test]
    fn test_library_14_dofile() {
        let dir = std::env::temp_dir().join(format!("ay-dofile-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let good = dir.join("good.lua");
        let bad = dir.join("bad.lua");
        std::fs::write(&good, "#!/usr/bin/env lua\nshared = 'set by file'\nreturn 20 + 22, 'done'\n")
            .expect("write good.lua");
        std::fs::write(&bad, "#!/usr/bin/env lua\nx = = 1\n").expect("write bad.lua");
        let missing = dir.join("missing.lua");

        let out = run(&format!(
            "print(dofile('{good}'))\n\
             print(shared)\n\
             print(pcall(dofile, '{bad}'))\n\
             print(pcall(dofile, '{missing}'))",
            good = good.display(),
            bad = bad.display(),
            missing = missing.display(),
        ));
        let expected = format!(
            "42\tdone\nset by file\nfalse\t{}:2: unexpected symbol near '='\nfalse\tcannot open {}: ",
            bad.display(),
            missing.display()
        );
        assert!(out.starts_with(&expected), "got {}", out);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_library_15_load_accepts_non_utf8_bytes() {
        let out = run(
            "local f = load('return \"\\255\" .. \"\\xfe\"')\n\
             local s = f()\n\
             local g = load('return #' .. '\"' .. s .. '\"')\n\
             print(#s, g())",
        );
        assert_eq!(out, "2\t2\n");
    }
}
